//! Entry trampolines.
//!
//! Each trampoline leaves the stack in the shape of a `RegisterFrame` and
//! calls `interrupt_dispatch` with a pointer to it. Vectors 0..47 get a named
//! stub each; 48..255 come from a `.rept` block of 16-byte stubs so their
//! addresses can be computed.
//!
//! The CPU pushes an error code for vectors 8, 10..14, 17, 21, 29 and 30.
//! Every other stub pushes a zero in its place so the frame is uniform.

use core::arch::global_asm;

use super::gdt::KERNEL_DATA_SELECTOR;

macro_rules! trampoline {
    ($name:ident, $vector:literal) => {
        global_asm!(
            concat!(".global ", stringify!($name)),
            concat!(stringify!($name), ":"),
            "    pushl $0",
            concat!("    pushl $", stringify!($vector)),
            "    jmp interrupt_common_stub",
            options(att_syntax)
        );
    };
    ($name:ident, $vector:literal, error_code) => {
        global_asm!(
            concat!(".global ", stringify!($name)),
            concat!(stringify!($name), ":"),
            concat!("    pushl $", stringify!($vector)),
            "    jmp interrupt_common_stub",
            options(att_syntax)
        );
    };
}

global_asm!(
    ".global interrupt_common_stub",
    "interrupt_common_stub:",
    "    pusha",
    "    xorl %eax, %eax",
    "    movw %ds, %ax",
    "    pushl %eax",
    "    movw ${data}, %ax",
    "    movw %ax, %ds",
    "    movw %ax, %es",
    "    movw %ax, %fs",
    "    movw %ax, %gs",
    "    pushl %esp",
    "    cld",
    "    call interrupt_dispatch",
    "    addl $4, %esp",
    "    popl %eax",
    "    movw %ax, %ds",
    "    movw %ax, %es",
    "    movw %ax, %fs",
    "    movw %ax, %gs",
    "    popa",
    "    addl $8, %esp",
    "    iret",
    data = const KERNEL_DATA_SELECTOR.0,
    options(att_syntax)
);

global_asm!(
    ".balign 16",
    ".global generic_trampolines",
    "generic_trampolines:",
    ".set generic_vector, 48",
    ".rept 208",
    "    .balign 16",
    "    pushl $0",
    "    pushl $generic_vector",
    "    jmp interrupt_common_stub",
    "    .set generic_vector, generic_vector + 1",
    ".endr",
    options(att_syntax)
);

trampoline!(isr0, 0);
trampoline!(isr1, 1);
trampoline!(isr2, 2);
trampoline!(isr3, 3);
trampoline!(isr4, 4);
trampoline!(isr5, 5);
trampoline!(isr6, 6);
trampoline!(isr7, 7);
trampoline!(isr8, 8, error_code);
trampoline!(isr9, 9);
trampoline!(isr10, 10, error_code);
trampoline!(isr11, 11, error_code);
trampoline!(isr12, 12, error_code);
trampoline!(isr13, 13, error_code);
trampoline!(isr14, 14, error_code);
trampoline!(isr15, 15);
trampoline!(isr16, 16);
trampoline!(isr17, 17, error_code);
trampoline!(isr18, 18);
trampoline!(isr19, 19);
trampoline!(isr20, 20);
trampoline!(isr21, 21, error_code);
trampoline!(isr22, 22);
trampoline!(isr23, 23);
trampoline!(isr24, 24);
trampoline!(isr25, 25);
trampoline!(isr26, 26);
trampoline!(isr27, 27);
trampoline!(isr28, 28);
trampoline!(isr29, 29, error_code);
trampoline!(isr30, 30, error_code);
trampoline!(isr31, 31);
trampoline!(irq0, 32);
trampoline!(irq1, 33);
trampoline!(irq2, 34);
trampoline!(irq3, 35);
trampoline!(irq4, 36);
trampoline!(irq5, 37);
trampoline!(irq6, 38);
trampoline!(irq7, 39);
trampoline!(irq8, 40);
trampoline!(irq9, 41);
trampoline!(irq10, 42);
trampoline!(irq11, 43);
trampoline!(irq12, 44);
trampoline!(irq13, 45);
trampoline!(irq14, 46);
trampoline!(irq15, 47);

extern "C" {
    fn isr0(); fn isr1(); fn isr2(); fn isr3(); fn isr4(); fn isr5(); fn isr6(); fn isr7();
    fn isr8(); fn isr9(); fn isr10(); fn isr11(); fn isr12(); fn isr13(); fn isr14(); fn isr15();
    fn isr16(); fn isr17(); fn isr18(); fn isr19(); fn isr20(); fn isr21(); fn isr22(); fn isr23();
    fn isr24(); fn isr25(); fn isr26(); fn isr27(); fn isr28(); fn isr29(); fn isr30(); fn isr31();
    fn irq0(); fn irq1(); fn irq2(); fn irq3(); fn irq4(); fn irq5(); fn irq6(); fn irq7();
    fn irq8(); fn irq9(); fn irq10(); fn irq11(); fn irq12(); fn irq13(); fn irq14(); fn irq15();
    fn generic_trampolines();
}

const NAMED_TRAMPOLINES: usize = 48;
const GENERIC_STRIDE: u32 = 16;

static NAMED: [unsafe extern "C" fn(); NAMED_TRAMPOLINES] = [
    isr0, isr1, isr2, isr3, isr4, isr5, isr6, isr7,
    isr8, isr9, isr10, isr11, isr12, isr13, isr14, isr15,
    isr16, isr17, isr18, isr19, isr20, isr21, isr22, isr23,
    isr24, isr25, isr26, isr27, isr28, isr29, isr30, isr31,
    irq0, irq1, irq2, irq3, irq4, irq5, irq6, irq7,
    irq8, irq9, irq10, irq11, irq12, irq13, irq14, irq15,
];

/// Entry address for `vector`.
pub fn trampoline_address(vector: u8) -> u32 {
    let vector = vector as usize;
    if vector < NAMED_TRAMPOLINES {
        NAMED[vector] as usize as u32
    } else {
        generic_trampolines as usize as u32 + (vector - NAMED_TRAMPOLINES) as u32 * GENERIC_STRIDE
    }
}
