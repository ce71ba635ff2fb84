//! Trio Kernel
//!
//! A small protected-mode kernel multiplexing three virtual terminals
//! over one CPU and one display.
//!
//! # Boot Process
//!
//! 1. bootloader loads the kernel and the boot filesystem ramdisk
//! 2. serial, GDT, IDT/PIC bring-up
//! 3. physical memory offset recorded, user address-space scaffolding
//!    installed
//! 4. terminals, PIT quantum, RTC, SYSCALL entry
//! 5. the boot filesystem is mounted and terminal 0's root shell runs;
//!    terminals 1 and 2 get theirs on the scheduler's first visit

#![no_std]
#![no_main]

use bootloader_api::{entry_point, BootInfo, BootloaderConfig};

use trio_kernel::{drivers, fs, gdt, interrupts, memory, process, serial, syscall, terminal};

/// Bootloader configuration: all of physical memory mapped at a
/// dynamic offset, ramdisk carried as the boot filesystem image.
pub static BOOTLOADER_CONFIG: BootloaderConfig = {
    let mut config = BootloaderConfig::new_default();
    config.mappings.physical_memory = Some(bootloader_api::config::Mapping::Dynamic);
    config
};

entry_point!(kernel_main, config = &BOOTLOADER_CONFIG);

/// Kernel entry point after bootloader handoff.
fn kernel_main(boot_info: &'static mut BootInfo) -> ! {
    serial::init();
    trio_kernel::serial_println!("Trio kernel booting");

    gdt::init();
    interrupts::init();

    let phys_mem_offset = boot_info
        .physical_memory_offset
        .into_option()
        .expect("physical memory offset not provided by bootloader");
    memory::init(phys_mem_offset);
    memory::paging::init();

    terminal::init();
    drivers::pit::init(drivers::pit::DEFAULT_HZ);
    drivers::rtc::init();
    interrupts::pic::enable_irq(1);
    syscall::init();

    let ramdisk_addr = boot_info.ramdisk_addr.into_option();
    let ramdisk_len = boot_info.ramdisk_len as usize;
    let image: &'static [u8] = match ramdisk_addr {
        Some(addr) if ramdisk_len > 0 => {
            // SAFETY: the bootloader maps the ramdisk at `addr` for
            // `ramdisk_len` bytes and nothing else owns it.
            unsafe { core::slice::from_raw_parts(addr as *const u8, ramdisk_len) }
        }
        _ => {
            trio_kernel::error!("no boot filesystem ramdisk; cannot start a shell");
            interrupts::hlt_loop();
        }
    };

    if let Err(err) = fs::init(image) {
        trio_kernel::error!("boot filesystem rejected: {:?}", err);
        interrupts::hlt_loop();
    }

    // First shell on terminal 0; the timer brings up the other two.
    process::loader::spawn_root_shell(0)
}

#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    trio_kernel::serial_println!("KERNEL PANIC: {}", info);
    interrupts::hlt_loop();
}
