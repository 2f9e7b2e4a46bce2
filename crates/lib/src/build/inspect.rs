//! Minimal executable header inspection.
//!
//! Only as much of ELF and Mach-O is parsed as needed to tell whether a file
//! is an executable and, for ELF, whether it needs a dynamic loader.

use std::fs;
use std::io;
use std::path::Path;

const PT_DYNAMIC: u32 = 2;
const PT_INTERP: u32 = 3;

const MACHO_MAGICS: [u32; 5] = [0xfeed_face, 0xfeed_facf, 0xcefa_edfe, 0xcffa_edfe, 0xcafe_babe];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutableFormat {
  Elf { interp: bool, dynamic: bool },
  MachO,
}

impl ExecutableFormat {
  /// Whether the executable runs without a dynamic loader or shared libraries.
  pub fn is_static(&self) -> bool {
    matches!(
      self,
      ExecutableFormat::Elf {
        interp: false,
        dynamic: false
      }
    )
  }
}

/// Identify the executable format of `bytes`, if any.
pub fn parse(bytes: &[u8]) -> Option<ExecutableFormat> {
  if bytes.starts_with(b"\x7fELF") {
    return parse_elf(bytes);
  }
  let magic = u32::from_be_bytes(bytes.get(..4)?.try_into().ok()?);
  MACHO_MAGICS.contains(&magic).then_some(ExecutableFormat::MachO)
}

fn parse_elf(bytes: &[u8]) -> Option<ExecutableFormat> {
  let is_64 = match bytes.get(4)? {
    1 => false,
    2 => true,
    _ => return None,
  };
  let little = match bytes.get(5)? {
    1 => true,
    2 => false,
    _ => return None,
  };
  let read = |offset: usize, len: usize| -> Option<u64> {
    let raw = bytes.get(offset..offset.checked_add(len)?)?;
    let mut buf = [0u8; 8];
    if little {
      buf[..len].copy_from_slice(raw);
      Some(u64::from_le_bytes(buf))
    } else {
      buf[8 - len..].copy_from_slice(raw);
      Some(u64::from_be_bytes(buf))
    }
  };

  let (phoff, phentsize, phnum) = if is_64 {
    (read(0x20, 8)?, read(0x36, 2)?, read(0x38, 2)?)
  } else {
    (read(0x1c, 4)?, read(0x2a, 2)?, read(0x2c, 2)?)
  };

  let mut interp = false;
  let mut dynamic = false;
  for i in 0..phnum {
    let offset = usize::try_from(phoff.checked_add(i.checked_mul(phentsize)?)?).ok()?;
    match read(offset, 4)? as u32 {
      PT_INTERP => interp = true,
      PT_DYNAMIC => dynamic = true,
      _ => {}
    }
  }
  Some(ExecutableFormat::Elf { interp, dynamic })
}

/// Check that the file at `path` is an executable suitable for `target_triple`.
///
/// Returns a human-readable reason on failure.
pub fn verify(path: &Path, target_triple: &str) -> Result<ExecutableFormat, String> {
  let bytes = fs::read(path).map_err(|e: io::Error| format!("cannot read {}: {}", path.display(), e))?;
  let format = parse(&bytes).ok_or_else(|| format!("{} is not an ELF or Mach-O executable", path.display()))?;

  if target_triple.ends_with("-musl") && !format.is_static() {
    return Err(match format {
      ExecutableFormat::Elf { interp: true, .. } => {
        format!("{} requests a program interpreter; expected a static executable", path.display())
      }
      ExecutableFormat::Elf { .. } => format!("{} has a dynamic section; expected a static executable", path.display()),
      ExecutableFormat::MachO => format!("{} is a Mach-O file; expected a static ELF executable", path.display()),
    });
  }
  Ok(format)
}
