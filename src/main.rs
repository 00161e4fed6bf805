#![cfg_attr(target_os = "none", no_std)]
#![cfg_attr(target_os = "none", no_main)]

#[cfg(target_os = "none")]
extern crate rlibc;

#[cfg(target_os = "none")]
mod boot {
    use core::panic::PanicInfo;

    use kcore::core::interrupts::{interrupts, timer};
    use kcore::core::kernel::get_all_statuses;
    use kcore::devices::drivers::{ps2_keyboard, speaker};
    use kcore::devices::drivers::speaker::{Note, Song};
    use kcore::{fatal, init_kernel, memory, print, println};

    const MULTIBOOT_HEADER_MAGIC: u32 = 0x1BAD_B002;
    const MULTIBOOT_BOOTLOADER_MAGIC: u32 = 0x2BAD_B002;
    /// Page-align modules, provide the memory map.
    const MULTIBOOT_FLAGS: u32 = 0b11;

    #[repr(C, align(4))]
    struct MultibootHeader {
        magic: u32,
        flags: u32,
        checksum: u32,
    }

    #[used]
    #[link_section = ".multiboot"]
    static MULTIBOOT_HEADER: MultibootHeader = MultibootHeader {
        magic: MULTIBOOT_HEADER_MAGIC,
        flags: MULTIBOOT_FLAGS,
        checksum: 0u32
            .wrapping_sub(MULTIBOOT_HEADER_MAGIC)
            .wrapping_sub(MULTIBOOT_FLAGS),
    };

    // The loader hands over with the magic in eax and the info pointer in
    // ebx, and no usable stack.
    core::arch::global_asm!(
        ".section .bss",
        ".align 16",
        "boot_stack_bottom:",
        ".skip 16384",
        "boot_stack_top:",
        ".section .text",
        ".global _start",
        "_start:",
        "    lea esp, [boot_stack_top]",
        "    push ebx",
        "    push eax",
        "    call kernel_main",
        "2:  cli",
        "    hlt",
        "    jmp 2b",
    );

    extern "C" {
        static __kernel_end: u8;
    }

    const ODE_TO_JOY: [Note; 8] = [
        Note::new(330, 200),
        Note::new(330, 200),
        Note::new(349, 200),
        Note::new(392, 200),
        Note::new(392, 200),
        Note::new(349, 200),
        Note::new(330, 200),
        Note::new(294, 400),
    ];

    #[no_mangle]
    extern "C" fn kernel_main(magic: u32, _info: u32) -> ! {
        if magic != MULTIBOOT_BOOTLOADER_MAGIC {
            fatal::halt_fmt(format_args!("not loaded by a Multiboot loader (magic {:#x})", magic));
        }

        let kernel_end = unsafe { core::ptr::addr_of!(__kernel_end) as usize };
        if let Err(err) = init_kernel(kernel_end) {
            fatal::halt_fmt(format_args!("kernel initialisation failed: {}", err));
        }
        memory::print_memory_layout();

        #[cfg(feature = "selftest")]
        kcore::core::kernel::selftest::run();

        println!("Type 'help' for commands.");
        let mut line = [0u8; 128];
        loop {
            print!("> ");
            let len = ps2_keyboard::read_line(&mut line, line.len());
            let Ok(command) = core::str::from_utf8(&line[..len]) else {
                continue;
            };
            run_command(command.trim());
        }
    }

    fn run_command(command: &str) {
        match command {
            "" => {}
            "help" => println!("help mem uptime status irqs beep song"),
            "mem" => memory::print_memory_layout(),
            "uptime" => println!("{} ms", timer::uptime_ms()),
            "status" => {
                let table = get_all_statuses();
                for component in table.iter() {
                    println!("{:<22} {}", component.name, component.status);
                }
                match table.first_failure() {
                    Some(failed) => println!("first failure: {}", failed.name),
                    None if table.all_ready() => println!("all components ready"),
                    None => println!("initialisation incomplete"),
                }
            }
            "irqs" => {
                let stats = interrupts::stats();
                println!(
                    "timer {} keyboard {} spurious {} unknown {}",
                    stats.irq_counts[0], stats.irq_counts[1], stats.spurious, stats.unknown_vectors
                );
            }
            "beep" => speaker::beep(880, 150),
            "song" => {
                let playback = speaker::play_song_cancellable(&Song::new(&ODE_TO_JOY));
                println!("{:?}", playback);
            }
            other => println!("{}", other),
        }
    }

    #[panic_handler]
    fn panic(info: &PanicInfo) -> ! {
        fatal::halt_fmt(format_args!("{}", info))
    }
}

#[cfg(not(target_os = "none"))]
fn main() {
    eprintln!("kernel: build with `cargo kbuild` and boot the image with a Multiboot loader");
}
