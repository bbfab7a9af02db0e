//! Framebuffer reader: positional reads of another process's pixel memory.
//!
//! The display server owns the screen; we never talk to it. Instead the
//! reader finds its PID, derives the address of the pixel region from
//! `/proc/<pid>/maps`, and serves every frame as one positional read of
//! `/proc/<pid>/mem` at that fixed address:
//!
//! 1. Scan `/proc/<pid>/exe` symlinks for the display-server binary.
//! 2. Small-screen devices: the framebuffer device mapping, plus the
//!    profile's fixed pointer offset, plus an 8-byte header skip.
//! 3. Large-screen devices: the GPU allocator keeps the pixel region in a
//!    chain of `[len:u32][…]` blocks after the last GPU device mapping;
//!    walk the chain until enough bytes are covered.
//!
//! The read itself is stateless (fixed offset, positional I/O), so any
//! number of sessions may call [`FramebufferReader::read_frame`]
//! concurrently. Bytes are a point-in-time snapshot; tearing is whatever
//! the display server itself allows.
//!
//! # Platform
//!
//! Positional reads need unix `pread`; on other targets the reader is
//! defined but every operation fails at runtime.

use std::fs::File;
use std::io;
use std::path::Path;

use tracing::{debug, info};

use crate::StreamError;
use crate::profile::{DeviceModel, DeviceProfile};
use crate::session::FrameSource;

// ── Well-known paths ─────────────────────────────────────────────

/// The display-server binary whose process owns the framebuffer.
pub const DISPLAY_SERVER_BIN: &str = "/usr/bin/xochitl";
/// Framebuffer device mapped by small-screen firmware.
pub const FRAMEBUFFER_DEVICE: &str = "/dev/fb0";
/// GPU device whose last mapping precedes the block chain (large screen).
pub const GPU_DEVICE: &str = "/dev/dri/card0";

/// Bytes to skip past the allocator header in front of the pixel region.
const POINTER_HEADER_SKIP: u64 = 8;

/// Block-walk sanity bounds: a corrupt chain must fail, not spin.
const MAX_BLOCK_HEADERS: usize = 4096;
const MAX_WALK_BYTES: u64 = 256 * 1024 * 1024;

// ── Process lookup ───────────────────────────────────────────────

/// Find the PID whose executable is `binary` by scanning `/proc`.
pub fn find_display_server(binary: &str) -> Result<u32, StreamError> {
    let entries = std::fs::read_dir("/proc")
        .map_err(|e| StreamError::ProcessNotFound(format!("{binary}: /proc unreadable: {e}")))?;

    for entry in entries.flatten() {
        let name = entry.file_name();
        let Some(pid) = name.to_str().and_then(|s| s.parse::<u32>().ok()) else {
            continue;
        };
        // Unreadable exe links (kernel threads, other users) are skipped.
        let Ok(exe) = std::fs::read_link(entry.path().join("exe")) else {
            continue;
        };
        if exe == Path::new(binary) {
            debug!(pid, binary, "display server located");
            return Ok(pid);
        }
    }
    Err(StreamError::ProcessNotFound(binary.to_string()))
}

// ── Memory map parsing ───────────────────────────────────────────

/// One line of `/proc/<pid>/maps`.
#[derive(Debug, Clone, PartialEq, Eq)]
struct MapRegion {
    start: u64,
    end: u64,
    path: String,
}

/// Parse a maps line (`start-end perms offset dev inode [path]`).
/// Lines without a pathname yield an empty `path`.
fn parse_maps_line(line: &str) -> Option<MapRegion> {
    let mut fields = line.split_whitespace();
    let range = fields.next()?;
    let (start, end) = range.split_once('-')?;
    let start = u64::from_str_radix(start, 16).ok()?;
    let end = u64::from_str_radix(end, 16).ok()?;
    // perms, offset, dev, inode
    let path = fields.nth(4).unwrap_or("").to_string();
    Some(MapRegion { start, end, path })
}

/// First mapping of `device` in the maps text.
fn first_device_region(maps: &str, device: &str) -> Option<MapRegion> {
    maps.lines()
        .filter_map(parse_maps_line)
        .find(|r| r.path == device)
}

/// Last mapping of `device` in the maps text.
fn last_device_region(maps: &str, device: &str) -> Option<MapRegion> {
    maps.lines()
        .filter_map(parse_maps_line)
        .filter(|r| r.path == device)
        .next_back()
}

// ── Positional read seam ─────────────────────────────────────────

/// Positional reads at absolute offsets. The production implementation is
/// `/proc/<pid>/mem`; tests substitute an in-memory image.
pub trait ReadAt {
    fn read_exact_at(&self, buf: &mut [u8], offset: u64) -> io::Result<()>;
}

#[cfg(unix)]
impl ReadAt for File {
    fn read_exact_at(&self, buf: &mut [u8], offset: u64) -> io::Result<()> {
        std::os::unix::fs::FileExt::read_exact_at(self, buf, offset)
    }
}

#[cfg(not(unix))]
impl ReadAt for File {
    fn read_exact_at(&self, _buf: &mut [u8], _offset: u64) -> io::Result<()> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "positional framebuffer reads are only available on unix",
        ))
    }
}

// ── GPU block walk ───────────────────────────────────────────────

/// Walk the `[len:u32 LE][…]:8`-headed block chain starting at `from`,
/// accumulating block lengths until they cover `frame_size` bytes. Returns
/// the address where the final (framebuffer) block starts.
fn walk_framebuffer_blocks<R: ReadAt>(
    mem: &R,
    from: u64,
    frame_size: u64,
) -> Result<u64, StreamError> {
    let mut addr = from;
    let mut covered = 0u64;
    let mut header = [0u8; 8];

    for _ in 0..MAX_BLOCK_HEADERS {
        mem.read_exact_at(&mut header, addr)
            .map_err(|e| StreamError::MemoryMapParse(format!("block header at {addr:#x}: {e}")))?;
        // Only the low 4 bytes carry the block length.
        let len = u32::from_le_bytes(header[0..4].try_into().unwrap()) as u64;

        covered += len;
        if covered >= frame_size {
            return Ok(addr + POINTER_HEADER_SKIP);
        }

        addr += POINTER_HEADER_SKIP + len;
        if addr.saturating_sub(from) > MAX_WALK_BYTES {
            break;
        }
    }
    Err(StreamError::MemoryMapParse(format!(
        "no framebuffer block within {MAX_WALK_BYTES} bytes of {from:#x}"
    )))
}

// ── Base resolution ──────────────────────────────────────────────

/// Resolve the pixel-region base address from a process's memory map.
///
/// `mem` is only consulted on the large-screen path (the block walk);
/// small-screen devices derive the base from the maps text alone.
fn resolve_base<R: ReadAt>(
    mem: &R,
    maps: &str,
    model: DeviceModel,
    profile: &DeviceProfile,
) -> Result<u64, StreamError> {
    match model {
        DeviceModel::Small => {
            let region = first_device_region(maps, FRAMEBUFFER_DEVICE).ok_or_else(|| {
                StreamError::MemoryMapParse(format!("no {FRAMEBUFFER_DEVICE} mapping"))
            })?;
            Ok(region.start + profile.pointer_offset + POINTER_HEADER_SKIP)
        }
        DeviceModel::Large => {
            let region = last_device_region(maps, GPU_DEVICE).ok_or_else(|| {
                StreamError::MemoryMapParse(format!("no {GPU_DEVICE} mapping"))
            })?;
            walk_framebuffer_blocks(mem, region.end, profile.frame_size() as u64)
        }
    }
}

// ── FramebufferReader ────────────────────────────────────────────

/// Positional reader over the display server's pixel memory.
///
/// Generic over [`ReadAt`] so the per-device address arithmetic and the
/// frame read itself are exercised against synthetic memory in tests; in
/// production `R` is the `/proc/<pid>/mem` file.
pub struct FramebufferReader<R: ReadAt = File> {
    mem: R,
    base: u64,
    frame_size: usize,
}

impl FramebufferReader {
    /// Locate the display server and attach to its framebuffer.
    pub fn open(model: DeviceModel, profile: &DeviceProfile) -> Result<Self, StreamError> {
        let pid = find_display_server(DISPLAY_SERVER_BIN)?;
        Self::attach(pid, model, profile)
    }

    /// Attach to a known PID (separated from [`open`](Self::open) for
    /// supervisors that already track the process).
    pub fn attach(pid: u32, model: DeviceModel, profile: &DeviceProfile) -> Result<Self, StreamError> {
        let maps = std::fs::read_to_string(format!("/proc/{pid}/maps"))
            .map_err(|e| StreamError::MemoryMapParse(format!("maps for pid {pid}: {e}")))?;
        let mem = File::open(format!("/proc/{pid}/mem"))
            .map_err(|e| StreamError::MemoryMapParse(format!("mem for pid {pid}: {e}")))?;

        let base = resolve_base(&mem, &maps, model, profile)?;
        let reader = Self::from_parts(mem, base, profile.frame_size());
        info!(
            pid,
            base = %format!("{base:#x}"),
            frame_size = reader.frame_size,
            "framebuffer attached"
        );
        Ok(reader)
    }
}

impl<R: ReadAt> FramebufferReader<R> {
    /// Wrap an already-resolved memory source and base address.
    fn from_parts(mem: R, base: u64, frame_size: usize) -> Self {
        Self {
            mem,
            base,
            frame_size,
        }
    }

    /// Bytes in one frame at the attached profile.
    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    /// Resolved address of the pixel region.
    pub fn base_address(&self) -> u64 {
        self.base
    }

    /// Copy the current frame into `buf` (`frame_size` bytes) with one
    /// positional read.
    pub fn read_frame(&self, buf: &mut [u8]) -> Result<(), StreamError> {
        if buf.len() != self.frame_size {
            return Err(StreamError::Malformed("read buffer size mismatch"));
        }
        self.mem
            .read_exact_at(buf, self.base)
            .map_err(StreamError::FramebufferRead)
    }
}

impl<R: ReadAt + Send + Sync> FrameSource for FramebufferReader<R> {
    fn frame_size(&self) -> usize {
        self.frame_size
    }

    fn read_frame(&self, buf: &mut [u8]) -> Result<(), StreamError> {
        FramebufferReader::read_frame(self, buf)
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_line_parses_device_mapping() {
        let region =
            parse_maps_line("7f1a2b3000-7f1a2b7000 rw-s 00000000 00:06 559 /dev/fb0").unwrap();
        assert_eq!(region.start, 0x7f1a2b3000);
        assert_eq!(region.end, 0x7f1a2b7000);
        assert_eq!(region.path, "/dev/fb0");
    }

    #[test]
    fn maps_line_without_path_is_anonymous() {
        let region = parse_maps_line("00400000-00452000 r-xp 00000000 08:02 173521").unwrap();
        assert_eq!(region.path, "");
    }

    #[test]
    fn maps_garbage_is_skipped() {
        assert!(parse_maps_line("").is_none());
        assert!(parse_maps_line("not-a-range rw-s 0 0 0").is_none());
    }

    const MAPS: &str = "\
00400000-00452000 r-xp 00000000 08:02 173521 /usr/bin/xochitl
7f1a00000000-7f1a00100000 rw-s 00000000 00:06 559 /dev/dri/card0
7f1a00200000-7f1a00300000 rw-s 00000000 00:06 559 /dev/dri/card0
7f1b00000000-7f1b04000000 rw-s 00000000 00:06 600 /dev/fb0
";

    #[test]
    fn first_and_last_device_regions() {
        let fb = first_device_region(MAPS, "/dev/fb0").unwrap();
        assert_eq!(fb.start, 0x7f1b00000000);

        let gpu = last_device_region(MAPS, "/dev/dri/card0").unwrap();
        assert_eq!(gpu.start, 0x7f1a00200000);
        assert_eq!(gpu.end, 0x7f1a00300000);

        assert!(first_device_region(MAPS, "/dev/null").is_none());
    }

    /// In-memory stand-in for `/proc/<pid>/mem`, offset by a base address.
    struct FakeMem {
        base: u64,
        bytes: Vec<u8>,
    }

    impl ReadAt for FakeMem {
        fn read_exact_at(&self, buf: &mut [u8], offset: u64) -> io::Result<()> {
            let start = offset
                .checked_sub(self.base)
                .ok_or_else(|| io::Error::from(io::ErrorKind::InvalidInput))?
                as usize;
            let end = start + buf.len();
            if end > self.bytes.len() {
                return Err(io::ErrorKind::UnexpectedEof.into());
            }
            buf.copy_from_slice(&self.bytes[start..end]);
            Ok(())
        }
    }

    fn block(len: u32, fill: u8) -> Vec<u8> {
        let mut bytes = vec![0u8; 8 + len as usize];
        bytes[0..4].copy_from_slice(&len.to_le_bytes());
        bytes[8..].fill(fill);
        bytes
    }

    #[test]
    fn block_walk_skips_to_covering_block() {
        // Two small blocks, then the framebuffer-sized one.
        let mut image = Vec::new();
        image.extend(block(16, 0x01));
        image.extend(block(32, 0x02));
        image.extend(block(4096, 0xFB));

        let mem = FakeMem {
            base: 0x4000_0000,
            bytes: image,
        };
        // Coverage 16 + 32 + 4096 ≥ 4096 lands on the third block.
        let base = walk_framebuffer_blocks(&mem, 0x4000_0000, 4096).unwrap();
        assert_eq!(base, 0x4000_0000 + 24 + 40 + 8);

        let mut probe = [0u8; 4];
        mem.read_exact_at(&mut probe, base).unwrap();
        assert_eq!(probe, [0xFB; 4]);
    }

    #[test]
    fn block_walk_takes_first_block_when_large_enough() {
        let mem = FakeMem {
            base: 0,
            bytes: block(4096, 0xFB),
        };
        assert_eq!(walk_framebuffer_blocks(&mem, 0, 4096).unwrap(), 8);
    }

    #[test]
    fn block_walk_fails_on_truncated_chain() {
        let mem = FakeMem {
            base: 0,
            bytes: block(16, 0x01),
        };
        assert!(matches!(
            walk_framebuffer_blocks(&mem, 0, 1 << 20),
            Err(StreamError::MemoryMapParse(_))
        ));
    }

    fn no_mem() -> FakeMem {
        FakeMem {
            base: 0,
            bytes: Vec::new(),
        }
    }

    #[test]
    fn small_base_adds_profile_offset_and_header_skip() {
        // Modern small-screen firmware: fixed pointer offset inside the
        // framebuffer mapping, plus the 8-byte header skip.
        let base = resolve_base(
            &no_mem(),
            MAPS,
            DeviceModel::Small,
            &DeviceProfile::modern_small(),
        )
        .unwrap();
        assert_eq!(base, 0x7f1b00000000 + 2_629_632 + 8);

        // Legacy firmware: offset zero, header skip only.
        let base = resolve_base(
            &no_mem(),
            MAPS,
            DeviceModel::Small,
            &DeviceProfile::legacy_small(),
        )
        .unwrap();
        assert_eq!(base, 0x7f1b00000000 + 8);
    }

    #[test]
    fn large_base_comes_from_the_block_walk() {
        // The GPU chain starts at the end of the last card0 mapping.
        let profile = DeviceProfile {
            width: 64,
            height: 8,
            bytes_per_pixel: 4,
            pointer_offset: 0,
            texture_flipped: true,
        };
        let mem = FakeMem {
            base: 0x7f1a00300000,
            bytes: block(profile.frame_size() as u32, 0xFB),
        };
        let base = resolve_base(&mem, MAPS, DeviceModel::Large, &profile).unwrap();
        assert_eq!(base, 0x7f1a00300000 + 8);
    }

    #[test]
    fn missing_device_mapping_is_an_error() {
        let maps = "00400000-00452000 r-xp 00000000 08:02 1 /usr/bin/xochitl\n";
        assert!(matches!(
            resolve_base(&no_mem(), maps, DeviceModel::Small, &DeviceProfile::modern_small()),
            Err(StreamError::MemoryMapParse(_))
        ));
        assert!(matches!(
            resolve_base(&no_mem(), maps, DeviceModel::Large, &DeviceProfile::large()),
            Err(StreamError::MemoryMapParse(_))
        ));
    }

    #[test]
    fn read_frame_copies_from_the_resolved_base() {
        // A 4×2 BGRA frame (32 bytes) at pointer offset 16 inside the
        // mapped framebuffer device.
        let profile = DeviceProfile {
            width: 4,
            height: 2,
            bytes_per_pixel: 4,
            pointer_offset: 16,
            texture_flipped: true,
        };
        let maps = "1000-2000 rw-s 00000000 00:06 5 /dev/fb0\n";

        let mut bytes = vec![0u8; 16 + 8 + profile.frame_size()];
        for (i, b) in bytes[24..].iter_mut().enumerate() {
            *b = 0xA0 ^ i as u8;
        }
        let mem = FakeMem {
            base: 0x1000,
            bytes: bytes.clone(),
        };

        let base = resolve_base(&mem, maps, DeviceModel::Small, &profile).unwrap();
        assert_eq!(base, 0x1000 + 16 + 8);

        let reader = FramebufferReader::from_parts(mem, base, profile.frame_size());
        let mut frame = vec![0u8; profile.frame_size()];
        reader.read_frame(&mut frame).unwrap();
        assert_eq!(frame, bytes[24..]);

        // A wrongly-sized buffer is refused before touching memory.
        let mut short = vec![0u8; 16];
        assert!(matches!(
            reader.read_frame(&mut short),
            Err(StreamError::Malformed(_))
        ));
    }
}
