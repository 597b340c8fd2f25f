//! Kernel source containers and the kernel-type dependency table.

use serde::{Deserialize, Serialize};

/// The four kernel types a bundle may contain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum KernelType {
    /// Stages A into the workspace.
    Wsa,
    /// Stages B into the workspace.
    Wsb,
    /// Scales C by beta ahead of a split-k main kernel.
    BetaC,
    /// The GEMM kernel itself.
    Main,
}

impl KernelType {
    /// All types in emission order: prerequisites first.
    pub const ALL: [KernelType; 4] =
        [KernelType::Wsa, KernelType::Wsb, KernelType::BetaC, KernelType::Main];

    /// Stable name.
    pub fn as_str(self) -> &'static str {
        match self {
            KernelType::Wsa => "WSA",
            KernelType::Wsb => "WSB",
            KernelType::BetaC => "BETAC",
            KernelType::Main => "MAIN",
        }
    }

    /// Entry point emitted for this type.
    pub fn entry_name(self) -> &'static str {
        match self {
            KernelType::Wsa => "miog_wsa",
            KernelType::Wsb => "miog_wsb",
            KernelType::BetaC => "miog_betac",
            KernelType::Main => "miog_main",
        }
    }

    /// Types that must complete before this one may run. Only the main
    /// kernel has prerequisites; the three preparation kernels are
    /// mutually unordered.
    pub fn dependencies(self) -> &'static [KernelType] {
        match self {
            KernelType::Main => &[KernelType::BetaC, KernelType::Wsa, KernelType::Wsb],
            _ => &[],
        }
    }

    /// Integer tag baked into emitted sources for tooling.
    pub fn tag(self) -> usize {
        match self {
            KernelType::Wsa => 0,
            KernelType::Wsb => 1,
            KernelType::BetaC => 2,
            KernelType::Main => 3,
        }
    }
}

/// Which of the GEMM parameters a kernel's entry point takes.
///
/// The argument tuple follows a fixed order: present pointers in
/// `a, b, c, w` order, then `alpha` if used, then `beta` if used, then one
/// element offset per present pointer in the same order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct KernUses {
    /// Takes the A buffer.
    pub a: bool,
    /// Takes the B buffer.
    pub b: bool,
    /// Takes the C buffer.
    pub c: bool,
    /// Takes the workspace buffer.
    pub w: bool,
    /// Takes the alpha scalar.
    pub alpha: bool,
    /// Takes the beta scalar.
    pub beta: bool,
}

impl KernUses {
    /// Pointers taken, in argument order.
    pub fn pointers(&self) -> Vec<char> {
        let mut out = Vec::new();
        if self.a {
            out.push('a');
        }
        if self.b {
            out.push('b');
        }
        if self.c {
            out.push('c');
        }
        if self.w {
            out.push('w');
        }
        out
    }
}

/// One emitted kernel: source text, entry point, parameter usage, and the
/// work sizes it must be enqueued with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KernelString {
    /// Which of the four types this kernel is.
    pub ktype: KernelType,
    /// Full device source.
    pub source: String,
    /// Entry point name.
    pub entry_name: String,
    /// Parameters the entry point takes.
    pub uses: KernUses,
    /// Global work size.
    pub global_work_size: usize,
    /// Local work size.
    pub local_work_size: usize,
}
