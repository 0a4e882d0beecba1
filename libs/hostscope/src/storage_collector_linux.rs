use crate::error::{ProbeError, ProbeResult};
use crate::storage_collector::{MountEntry, StorageSource, Usage};

const MOUNTS_PATH: &str = "/proc/self/mounts";

/// Mount table from `/proc/self/mounts`, usage from `statvfs(2)`.
#[derive(Debug, Default)]
pub struct ProcMountsSource;

impl StorageSource for ProcMountsSource {
    fn mounts(&self) -> ProbeResult<Vec<MountEntry>> {
        let text = crate::probe::read_source(MOUNTS_PATH)?;
        let mounts = parse_mounts(&text);
        if mounts.is_empty() {
            return Err(ProbeError::malformed(MOUNTS_PATH, "no mount entries"));
        }
        Ok(mounts)
    }

    fn usage(&self, mount: &MountEntry) -> ProbeResult<Usage> {
        crate::storage_collector::statvfs_usage(&mount.mountpoint)
    }
}

/// Undo the octal escaping the kernel applies to whitespace and backslashes
/// in mount fields (`\040` for space, `\011` for tab, `\012`, `\134`).
fn unescape_mount_field(field: &str) -> String {
    let bytes = field.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\'
            && let Some(code) = field
                .get(i + 1..i + 4)
                .and_then(|oct| u8::from_str_radix(oct, 8).ok())
        {
            out.push(code);
            i += 4;
            continue;
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// Parse `/proc/self/mounts` lines: `device mountpoint fstype options dump pass`.
pub(crate) fn parse_mounts(text: &str) -> Vec<MountEntry> {
    text.lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let device = fields.next()?;
            let mountpoint = fields.next()?;
            let filesystem = fields.next()?;
            let options = fields.next().unwrap_or_default();
            Some(MountEntry {
                device: unescape_mount_field(device),
                mountpoint: unescape_mount_field(mountpoint),
                filesystem: filesystem.to_owned(),
                read_only: options.split(',').any(|opt| opt == "ro"),
                reported: None,
            })
        })
        .collect()
}
