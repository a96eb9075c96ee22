//! The guest execution core (spec.md §4.1): runs guest threads natively via
//! the [`GuestProcessController`] collaborator, classifies trap opcodes, and
//! dispatches syscalls through the `syscalls` crate's table.

use address::GuestAddress;
use collaborators::{GuestProcessController, GuestThreadId, RegisterSnapshot};
use constants::{TLS_COMMAND_BUFFER_SIZE, TLS_SLOT_SIZE};
use kernel_abstractions::Handle;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use syscalls::{SyscallArgs, SyscallContext, SyscallObject, SVC_EXIT_PROCESS, SVC_EXIT_THREAD};
use threading::{GuestThread, ThreadPriority};

use crate::error::FatalTrapError;
use crate::opcode::{decode, TrapKind};
use crate::runtime::{ThreadControllerShim, ThreadRuntime};

/// Runs every guest thread of a single guest process (spec.md §4.1
/// "Concurrency contract": at most one dispatcher callback runs at a time
/// per process).
pub struct GuestExecutor<P: GuestProcessController + 'static> {
    controller: Arc<P>,
    ctx: Arc<SyscallContext>,
    dispatch_lock: Mutex<()>,
    runtimes: Mutex<HashMap<Handle, Arc<ThreadRuntime>>>,
}

impl<P: GuestProcessController + 'static> GuestExecutor<P> {
    pub fn new(controller: Arc<P>, ctx: Arc<SyscallContext>) -> Self {
        GuestExecutor {
            controller,
            ctx,
            dispatch_lock: Mutex::new(()),
            runtimes: Mutex::new(HashMap::new()),
        }
    }

    /// `spawn(entry, stack_top, tls_slot, priority)` (spec.md §4.1): creates
    /// the native thread, registers the guest-visible kernel object, then
    /// blocks until the thread's mandatory ready-rendezvous trap arrives,
    /// so the caller can seed its initial registers deterministically
    /// (spec.md §8 Scenario F).
    pub fn spawn(
        &self,
        entry: GuestAddress,
        stack_top: GuestAddress,
        tls: GuestAddress,
        priority: ThreadPriority,
    ) -> Handle {
        let os_id = self.controller.spawn(entry, stack_top, priority.raw());

        let thread = Arc::new(GuestThread::new(Handle::NULL, entry, 0, stack_top, tls, priority));
        let handle = self.ctx.handles().open(SyscallObject::Thread(thread.clone()));

        let runtime = Arc::new(ThreadRuntime::new(os_id));
        thread.attach_controller(Arc::new(ThreadControllerShim { controller: self.controller.clone(), os_id }));
        self.runtimes.lock().insert(handle, runtime.clone());

        runtime.wait_for_rendezvous();
        log::debug!("thread {handle:?} observed ready rendezvous");
        thread.mark_started();

        handle
    }

    /// Attaches execution bookkeeping to a [`GuestThread`] kernel object
    /// that already exists in the handle table (created by `svcCreateThread`
    /// rather than [`Self::spawn`]) and starts its native thread. Called by
    /// whatever wires `svcStartThread` to the executor.
    pub fn attach_and_start(&self, handle: Handle) -> Result<(), FatalTrapError> {
        let thread = self.thread_for(handle)?;
        let os_id = self.controller.spawn(thread.entry_point, thread.stack_top, thread.priority().raw());
        let runtime = Arc::new(ThreadRuntime::new(os_id));
        thread.attach_controller(Arc::new(ThreadControllerShim { controller: self.controller.clone(), os_id }));
        self.runtimes.lock().insert(handle, runtime.clone());
        runtime.wait_for_rendezvous();
        thread.mark_started();
        Ok(())
    }

    /// `invoke_in_guest(function, regs, thread)` (spec.md §4.1): runs a
    /// host-provided routine inside the guest process on an already-paused
    /// thread, restoring its original registers once the routine's
    /// ready-rendezvous trap fires.
    pub fn invoke_in_guest(
        &self,
        handle: Handle,
        entry: GuestAddress,
        seed_regs: RegisterSnapshot,
    ) -> Result<RegisterSnapshot, FatalTrapError> {
        let runtime = self.runtime_for(handle)?;

        let saved = self.controller.read_regs(runtime.os_id);

        let mut retarget = seed_regs;
        retarget.pc = entry.as_usize() as u64;
        self.controller.write_regs(runtime.os_id, &retarget);
        self.controller.resume(runtime.os_id);

        let result = runtime.wait_for_rendezvous();

        self.controller.write_regs(runtime.os_id, &saved);
        self.controller.resume(runtime.os_id);

        Ok(result)
    }

    pub fn pause(&self, handle: Handle) -> Result<(), FatalTrapError> {
        let runtime = self.runtime_for(handle)?;
        self.controller.pause(runtime.os_id);
        Ok(())
    }

    pub fn resume(&self, handle: Handle) -> Result<(), FatalTrapError> {
        let runtime = self.runtime_for(handle)?;
        self.controller.resume(runtime.os_id);
        Ok(())
    }

    pub fn kill(&self, handle: Handle) -> Result<(), FatalTrapError> {
        let runtime = self.runtime_for(handle)?;
        self.controller.kill(runtime.os_id);
        self.runtimes.lock().remove(&handle);
        Ok(())
    }

    pub fn read_regs(&self, handle: Handle) -> Result<RegisterSnapshot, FatalTrapError> {
        let runtime = self.runtime_for(handle)?;
        Ok(self.controller.read_regs(runtime.os_id))
    }

    pub fn write_regs(&self, handle: Handle, regs: &RegisterSnapshot) -> Result<(), FatalTrapError> {
        let runtime = self.runtime_for(handle)?;
        self.controller.write_regs(runtime.os_id, regs);
        Ok(())
    }

    /// The dispatcher callback (spec.md §4.1): called whenever `handle`'s
    /// native thread traps. Classifies the trap, runs the matching handler,
    /// writes results back, and advances `pc` past the trap word. Only one
    /// invocation runs at a time across the whole process.
    pub fn handle_trap(&self, handle: Handle) -> Result<(), FatalTrapError> {
        let _dispatch_guard = self.dispatch_lock.lock();

        let runtime = self.runtime_for(handle)?;
        let mut regs = self.controller.read_regs(runtime.os_id);
        let imm = self.controller.read_break_imm(GuestAddress::new(regs.pc as usize));

        match decode(imm) {
            TrapKind::Syscall(id) => {
                let thread = self.thread_for(handle)?;
                let mut tls_bytes = [0u8; TLS_COMMAND_BUFFER_SIZE];
                let tls_slice = unsafe {
                    std::slice::from_raw_parts(thread.tls.as_ptr::<u8>(), TLS_SLOT_SIZE.min(TLS_COMMAND_BUFFER_SIZE))
                };
                tls_bytes[..tls_slice.len()].copy_from_slice(tls_slice);

                let args = SyscallArgs(regs.x[0..8].try_into().unwrap());
                let out = match syscalls::dispatch(id, args, &self.ctx, &mut tls_bytes) {
                    Ok(out) => out,
                    Err(id) => {
                        log::error!("syscall id {id:#x} has no handler on thread {handle:?}");
                        return Err(FatalTrapError::UnknownSyscall { handle, id });
                    }
                };

                let tls_dest = unsafe {
                    std::slice::from_raw_parts_mut(
                        thread.tls.as_mut_ptr::<u8>(),
                        TLS_SLOT_SIZE.min(TLS_COMMAND_BUFFER_SIZE),
                    )
                };
                tls_dest.copy_from_slice(&tls_bytes[..tls_dest.len()]);

                regs.x[0] = out.result.raw() as u64;
                regs.x[1] = out.values[0];
                regs.x[2] = out.values[1];
                regs.x[3] = out.values[2];
                regs.pc += 4;
                self.controller.write_regs(runtime.os_id, &regs);

                if id == SVC_EXIT_THREAD || id == SVC_EXIT_PROCESS {
                    thread.mark_exited();
                    self.runtimes.lock().remove(&handle);
                } else {
                    self.controller.resume(runtime.os_id);
                }
            }
            TrapKind::TlsRegisterRead(reg) => {
                let thread = self.thread_for(handle)?;
                regs.x[reg as usize] = thread.tls.as_usize() as u64;
                regs.pc += 4;
                self.controller.write_regs(runtime.os_id, &regs);
                self.controller.resume(runtime.os_id);
            }
            TrapKind::ReadyRendezvous => {
                regs.pc += 4;
                runtime.signal_rendezvous(regs);
            }
            TrapKind::Fatal(imm) => {
                log::error!("fatal trap opcode {imm:#x} on thread {handle:?}");
                return Err(FatalTrapError::UnclassifiedOpcode { handle, imm });
            }
        }

        Ok(())
    }

    fn runtime_for(&self, handle: Handle) -> Result<Arc<ThreadRuntime>, FatalTrapError> {
        self.runtimes
            .lock()
            .get(&handle)
            .cloned()
            .ok_or(FatalTrapError::UnknownThread(handle))
    }

    fn thread_for(&self, handle: Handle) -> Result<Arc<GuestThread>, FatalTrapError> {
        self.ctx
            .handles()
            .get(handle)
            .and_then(SyscallObject::as_thread)
            .cloned()
            .ok_or(FatalTrapError::UnknownThread(handle))
    }

    /// Registers a thread and its runtime bookkeeping directly, bypassing
    /// the ready-rendezvous wait `spawn`/`attach_and_start` perform. Used
    /// only by tests that drive `handle_trap` manually instead of through a
    /// real native thread.
    #[cfg(test)]
    pub(crate) fn register_for_test(&self, thread: Arc<GuestThread>, os_id: GuestThreadId) -> Handle {
        let handle = self.ctx.handles().open(SyscallObject::Thread(thread.clone()));
        self.runtimes.lock().insert(handle, Arc::new(ThreadRuntime::new(os_id)));
        thread.attach_controller(Arc::new(ThreadControllerShim { controller: self.controller.clone(), os_id }));
        handle
    }

    #[cfg(test)]
    pub(crate) fn controller_for_test(&self) -> &P {
        &self.controller
    }
}
