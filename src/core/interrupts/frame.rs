use core::fmt;

/// Register state saved by the entry trampolines, lowest address first.
///
/// ```text
/// ds                                  <- pushed by the common stub
/// edi esi ebp esp ebx edx ecx eax     <- pusha
/// vector error_code                   <- per-vector stub (or the CPU)
/// eip cs eflags [user_esp ss]         <- CPU
/// ```
///
/// General-purpose fields written by a handler are restored by `popa` on
/// the way out. `user_esp` and `ss` are only valid when the interrupt
/// crossed from ring 3.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegisterFrame {
    pub ds: u32,
    pub edi: u32,
    pub esi: u32,
    pub ebp: u32,
    pub esp: u32,
    pub ebx: u32,
    pub edx: u32,
    pub ecx: u32,
    pub eax: u32,
    pub vector: u32,
    pub error_code: u32,
    pub eip: u32,
    pub cs: u32,
    pub eflags: u32,
    pub user_esp: u32,
    pub ss: u32,
}

impl RegisterFrame {
    /// A frame as it would look for `vector` with the given error code.
    pub const fn for_vector(vector: u8, error_code: u32) -> Self {
        Self {
            ds: 0,
            edi: 0,
            esi: 0,
            ebp: 0,
            esp: 0,
            ebx: 0,
            edx: 0,
            ecx: 0,
            eax: 0,
            vector: vector as u32,
            error_code,
            eip: 0,
            cs: 0,
            eflags: 0,
            user_esp: 0,
            ss: 0,
        }
    }

    /// Whether the CPU was in ring 3 when the interrupt arrived.
    pub const fn from_user_mode(&self) -> bool {
        self.cs & 0b11 == 3
    }
}

impl fmt::Display for RegisterFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "vector={} error_code={:#x}", self.vector, self.error_code)?;
        writeln!(
            f,
            "eax={:#010x} ebx={:#010x} ecx={:#010x} edx={:#010x}",
            self.eax, self.ebx, self.ecx, self.edx
        )?;
        writeln!(
            f,
            "esi={:#010x} edi={:#010x} ebp={:#010x} esp={:#010x}",
            self.esi, self.edi, self.ebp, self.esp
        )?;
        write!(
            f,
            "eip={:#010x} cs={:#06x} ds={:#06x} eflags={:#010x}",
            self.eip, self.cs, self.ds, self.eflags
        )?;
        if self.from_user_mode() {
            write!(f, "\nuser_esp={:#010x} ss={:#06x}", self.user_esp, self.ss)?;
        }
        Ok(())
    }
}
