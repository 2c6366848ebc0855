// Open-mode strings resolved into backend access flags.
use std::fmt;
use std::str::FromStr;

use crate::core::error::{Error, ErrorKind};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AccessFlag {
    ReadOnly,
    WriteOnly,
    ReadWrite,
}

impl AccessFlag {
    /// POSIX open flag carried on the wire for this access level.
    pub fn as_raw(self) -> i32 {
        match self {
            AccessFlag::ReadOnly => libc::O_RDONLY,
            AccessFlag::WriteOnly => libc::O_WRONLY,
            AccessFlag::ReadWrite => libc::O_RDWR,
        }
    }

    pub fn can_read(self) -> bool {
        matches!(self, AccessFlag::ReadOnly | AccessFlag::ReadWrite)
    }

    pub fn can_write(self) -> bool {
        matches!(self, AccessFlag::WriteOnly | AccessFlag::ReadWrite)
    }
}

impl fmt::Display for AccessFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            AccessFlag::ReadOnly => "read-only",
            AccessFlag::WriteOnly => "write-only",
            AccessFlag::ReadWrite => "read-write",
        };
        f.write_str(label)
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct OpenMode {
    pub access: AccessFlag,
    pub create_if_missing: bool,
    pub append_to_end: bool,
}

impl OpenMode {
    /// Resolves `r`, `r+`, `w`, `w+`, `a` or `a+`. Anything else is `UnsupportedMode`.
    pub fn resolve(mode: &str) -> Result<Self, Error> {
        let (access, create_if_missing, append_to_end) = match mode {
            "r" => (AccessFlag::ReadOnly, false, false),
            "r+" => (AccessFlag::ReadWrite, false, false),
            "w" => (AccessFlag::WriteOnly, true, false),
            "w+" => (AccessFlag::ReadWrite, true, false),
            "a" => (AccessFlag::WriteOnly, true, true),
            "a+" => (AccessFlag::ReadWrite, true, true),
            other => {
                return Err(Error::new(ErrorKind::UnsupportedMode)
                    .with_message(format!("unsupported open mode {other:?}")));
            }
        };
        Ok(Self {
            access,
            create_if_missing,
            append_to_end,
        })
    }
}

impl FromStr for OpenMode {
    type Err = Error;

    fn from_str(mode: &str) -> Result<Self, Self::Err> {
        Self::resolve(mode)
    }
}
