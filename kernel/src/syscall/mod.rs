//! System call entry and dispatch.
//!
//! User programs issue the `syscall` instruction with the call number
//! in `rax` and up to three arguments in `rdi`/`rsi`/`rdx`; the result
//! comes back in `rax`, with -1 covering every error. The entry stub
//! hops onto the current process's kernel stack, preserves the user
//! return state, and calls the Rust dispatcher.
//!
//! Single core: the kernel stack pointer the stub loads is one static,
//! rewritten on every process switch alongside TSS.rsp0.

pub mod handlers;

use core::arch::naked_asm;
use core::sync::atomic::{AtomicU64, Ordering};

use x86_64::registers::model_specific::{Efer, EferFlags, Msr};

/// System call numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u64)]
pub enum SyscallNumber {
    /// Terminate the current process.
    Halt = 1,
    /// Load and run a program; returns its exit status.
    Execute = 2,
    /// Read from a descriptor.
    Read = 3,
    /// Write to a descriptor.
    Write = 4,
    /// Bind a named file or device to a descriptor.
    Open = 5,
    /// Release a descriptor.
    Close = 6,
    /// Copy the creating command's argument tail.
    GetArgs = 7,
    /// Map the video page into the caller's view.
    VidMap = 8,
    /// Install a signal handler (unimplemented, always fails).
    SetHandler = 9,
    /// Return from a signal handler (unimplemented, always fails).
    SigReturn = 10,
}

impl TryFrom<u64> for SyscallNumber {
    type Error = ();

    fn try_from(value: u64) -> Result<Self, ()> {
        match value {
            1 => Ok(SyscallNumber::Halt),
            2 => Ok(SyscallNumber::Execute),
            3 => Ok(SyscallNumber::Read),
            4 => Ok(SyscallNumber::Write),
            5 => Ok(SyscallNumber::Open),
            6 => Ok(SyscallNumber::Close),
            7 => Ok(SyscallNumber::GetArgs),
            8 => Ok(SyscallNumber::VidMap),
            9 => Ok(SyscallNumber::SetHandler),
            10 => Ok(SyscallNumber::SigReturn),
            _ => Err(()),
        }
    }
}

/// Userspace error value; every internal error folds into this.
pub const SYSCALL_ERROR: i64 = -1;

// MSR addresses for the SYSCALL/SYSRET path.
const IA32_STAR: u32 = 0xC000_0081;
const IA32_LSTAR: u32 = 0xC000_0082;
const IA32_SFMASK: u32 = 0xC000_0084;

/// Kernel stack top the entry stub switches to. Follows the current
/// process; see [`set_kernel_stack`].
static KERNEL_STACK_TOP: AtomicU64 = AtomicU64::new(0);

/// Parking spot for the user stack pointer between entry and the
/// switch onto the kernel stack. Safe as a single static because entry
/// runs with interrupts masked and the value moves onto the kernel
/// stack immediately.
static USER_RSP_SCRATCH: AtomicU64 = AtomicU64::new(0);

/// Point the entry stub at a process's kernel stack.
pub fn set_kernel_stack(top: u64) {
    KERNEL_STACK_TOP.store(top, Ordering::Release);
}

/// Enable the `syscall` instruction and install the entry stub.
pub fn init() {
    let selectors = crate::gdt::selectors();
    // STAR[47:32]: syscall loads CS from it, SS from it + 8, the
    // kernel pair. STAR[63:48]: sysret derives SS = base + 8 and
    // CS = base + 16, landing on user data then user code.
    let syscall_base = selectors.kernel_code.0 as u64;
    let sysret_base = (selectors.kernel_data.0 | 3) as u64;
    let star = (sysret_base << 48) | (syscall_base << 32);

    unsafe {
        Efer::update(|flags| flags.insert(EferFlags::SYSTEM_CALL_EXTENSIONS));
        Msr::new(IA32_STAR).write(star);
        Msr::new(IA32_LSTAR).write(syscall_entry as usize as u64);
        // Mask IF and TF on entry; blocking waits re-enable IF at
        // explicit points only.
        Msr::new(IA32_SFMASK).write(0x200 | 0x100);
    }

    crate::serial_println!("[SYS ] SYSCALL entry installed");
}

/// SYSCALL entry stub.
///
/// On entry the CPU has saved user RIP in `rcx` and RFLAGS in `r11`
/// and masked interrupts per SFMASK. The stub parks the user stack
/// pointer, switches to the current process's kernel stack, preserves
/// the sysret state there, and calls [`dispatch`] with the System V
/// argument order.
#[unsafe(naked)]
pub unsafe extern "C" fn syscall_entry() {
    naked_asm!(
        // Park user rsp, adopt the kernel stack.
        "mov qword ptr [rip + {scratch}], rsp",
        "mov rsp, qword ptr [rip + {kstack}]",
        // The parked value moves onto the kernel stack right away, so
        // a preemption inside the syscall cannot lose it.
        "push qword ptr [rip + {scratch}]",
        "push rcx", // user RIP
        "push r11", // user RFLAGS
        // dispatch(num, a1, a2, a3): user rax/rdi/rsi/rdx.
        "mov rcx, rdx",
        "mov rdx, rsi",
        "mov rsi, rdi",
        "mov rdi, rax",
        // Three pushes above leave rsp == 8 (mod 16); align for the call.
        "sub rsp, 8",
        "call {dispatch}",
        "add rsp, 8",
        // Result is already in rax; restore the sysret state.
        "pop r11",
        "pop rcx",
        "pop rsp",
        "sysretq",
        scratch = sym USER_RSP_SCRATCH,
        kstack = sym KERNEL_STACK_TOP,
        dispatch = sym dispatch,
    );
}

/// Route a system call to its handler.
pub extern "C" fn dispatch(num: u64, a1: u64, a2: u64, a3: u64) -> i64 {
    match SyscallNumber::try_from(num) {
        Ok(syscall) => handlers::handle(syscall, a1, a2, a3),
        Err(()) => SYSCALL_ERROR,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_syscall_numbers_round_trip() {
        for n in 1..=10u64 {
            let parsed = SyscallNumber::try_from(n).unwrap();
            assert_eq!(parsed as u64, n);
        }
    }

    #[test]
    fn test_unknown_numbers_rejected() {
        assert!(SyscallNumber::try_from(0).is_err());
        assert!(SyscallNumber::try_from(11).is_err());
        assert!(SyscallNumber::try_from(u64::MAX).is_err());
    }

    #[test]
    fn test_dispatch_rejects_unknown_number() {
        assert_eq!(dispatch(0, 0, 0, 0), SYSCALL_ERROR);
        assert_eq!(dispatch(99, 1, 2, 3), SYSCALL_ERROR);
    }
}
