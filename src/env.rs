//! Execution environments encoders are generated for, and the run
//! parameters that select them.

use std::fmt;

/// Processor mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Mode {
    M16,
    M32,
    M64,
}

impl Mode {
    pub const ALL: [Mode; 3] = [Mode::M16, Mode::M32, Mode::M64];

    pub fn bits(self) -> u32 {
        match self {
            Self::M16 => 16,
            Self::M32 => 32,
            Self::M64 => 64,
        }
    }

    /// The address size used without a 0x67 prefix.
    pub fn default_address_size(self) -> AddressSize {
        match self {
            Self::M16 => AddressSize::A16,
            Self::M32 => AddressSize::A32,
            Self::M64 => AddressSize::A64,
        }
    }
}

/// Effective address size.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AddressSize {
    A16,
    A32,
    A64,
}

impl AddressSize {
    pub const ALL: [AddressSize; 3] = [AddressSize::A16, AddressSize::A32, AddressSize::A64];

    pub fn bits(self) -> u32 {
        match self {
            Self::A16 => 16,
            Self::A32 => 32,
            Self::A64 => 64,
        }
    }
}

/// A processor mode paired with an address size it supports.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Environment {
    pub mode: Mode,
    pub asz: AddressSize,
}

impl Environment {
    /// `None` for combinations the processor cannot execute: 64-bit
    /// addressing outside 64-bit mode and 16-bit addressing inside it.
    pub fn new(mode: Mode, asz: AddressSize) -> Option<Self> {
        let valid = match mode {
            Mode::M64 => asz != AddressSize::A16,
            Mode::M16 | Mode::M32 => asz != AddressSize::A64,
        };
        valid.then_some(Self { mode, asz })
    }

    /// Whether addressing in this environment needs the 0x67 prefix.
    pub fn overrides_address_size(&self) -> bool {
        self.asz != self.mode.default_address_size()
    }

    /// A name usable as a Rust module identifier.
    pub fn module_name(&self) -> String {
        format!("mode{}_asz{}", self.mode.bits(), self.asz.bits())
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "mode {}, asz {}", self.mode.bits(), self.asz.bits())
    }
}

/// Which modes and address sizes to generate encoders for.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunConfig {
    pub modes: Vec<Mode>,
    pub address_sizes: Vec<AddressSize>,
}

impl Default for RunConfig {
    /// 64-bit mode with 64-bit addressing.
    fn default() -> Self {
        Self {
            modes: vec![Mode::M64],
            address_sizes: vec![AddressSize::A64],
        }
    }
}

impl RunConfig {
    /// Resolve command-line selections.
    ///
    /// `all` selects every mode and address size. A single mode without
    /// address sizes gets the address sizes that mode can use with or
    /// without an override prefix. No modes means 64-bit mode.
    pub fn from_flags(modes: &[Mode], address_sizes: &[AddressSize], all: bool) -> Self {
        if all {
            return Self {
                modes: Mode::ALL.to_vec(),
                address_sizes: AddressSize::ALL.to_vec(),
            };
        }
        let mut modes = dedup(modes);
        let mut address_sizes = dedup(address_sizes);
        if address_sizes.is_empty() {
            address_sizes = match modes.as_slice() {
                [] => vec![AddressSize::A64],
                [Mode::M64] => vec![AddressSize::A32, AddressSize::A64],
                [Mode::M32] | [Mode::M16] => vec![AddressSize::A16, AddressSize::A32],
                _ => AddressSize::ALL.to_vec(),
            };
        }
        if modes.is_empty() {
            modes.push(Mode::M64);
        }
        Self {
            modes,
            address_sizes,
        }
    }

    /// Every valid (mode, address size) pair, modes outermost.
    pub fn environments(&self) -> Vec<Environment> {
        self.modes
            .iter()
            .flat_map(|&mode| {
                self.address_sizes
                    .iter()
                    .filter_map(move |&asz| Environment::new(mode, asz))
            })
            .collect()
    }
}

fn dedup<T: Copy + PartialEq>(items: &[T]) -> Vec<T> {
    let mut out = Vec::with_capacity(items.len());
    for &item in items {
        if !out.contains(&item) {
            out.push(item);
        }
    }
    out
}
