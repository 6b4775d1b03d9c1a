//! Domain descriptor introspection.
//!
//! Reads the domain XML returned by `virsh dumpxml` and extracts the
//! file-backed disks and the graphics channel. Missing elements are normal
//! outcomes; malformed markup is recorded as an anomaly and never fails.

use crate::types::{DiskDevice, DiskSource, GraphicsKind};
use log::warn;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde::{Deserialize, Serialize};

/// Placeholder shown when a descriptor declares no file-backed disk.
pub const UNKNOWN_DISK: &str = "unknown";

/// Everything the manager needs from a domain descriptor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainDescriptor {
    /// File-backed disks in document order.
    pub disks: Vec<DiskSource>,
    pub graphics: GraphicsKind,
    /// Raw `type` attribute of the first `<graphics>` element.
    pub graphics_type_attr: Option<String>,
    /// Notes about markup that could not be read completely.
    pub anomalies: Vec<String>,
}

impl DomainDescriptor {
    /// First file-backed disk path in document order.
    pub fn primary_disk_path(&self) -> Option<&str> {
        self.disks.first().map(|d| d.path.as_str())
    }

    /// All file-backed disk paths in document order.
    pub fn disk_paths(&self) -> Vec<String> {
        self.disks.iter().map(|d| d.path.clone()).collect()
    }

    /// Disk images owned by the VM (install media attached as cdrom or
    /// floppy is excluded).
    pub fn reclaimable_paths(&self) -> Vec<String> {
        self.disks
            .iter()
            .filter(|d| d.device == DiskDevice::Disk)
            .map(|d| d.path.clone())
            .collect()
    }
}

/// Parse a domain descriptor.
pub fn introspect(xml: &str) -> DomainDescriptor {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut desc = DomainDescriptor::default();
    let mut graphics_seen = false;
    // Open element names; `disk_device` tracks the innermost open <disk>.
    let mut stack: Vec<Vec<u8>> = Vec::new();
    let mut disk_device: Option<DiskDevice> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => {
                handle_element(e, &stack, disk_device, &mut desc, &mut graphics_seen);
                if e.local_name().as_ref() == b"disk" {
                    disk_device = Some(DiskDevice::from_attr(attr(e, b"device").as_deref()));
                }
                stack.push(e.local_name().as_ref().to_vec());
            }
            Ok(Event::Empty(ref e)) => {
                handle_element(e, &stack, disk_device, &mut desc, &mut graphics_seen);
            }
            Ok(Event::End(ref e)) => {
                stack.pop();
                if e.local_name().as_ref() == b"disk" {
                    disk_device = None;
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                let note = format!(
                    "malformed descriptor at position {}: {}",
                    reader.buffer_position(),
                    e
                );
                warn!("{}", note);
                desc.anomalies.push(note);
                break;
            }
            _ => {}
        }
    }

    if desc.disks.is_empty() {
        desc.anomalies.push("no file-backed disk".into());
    }
    if !graphics_seen {
        desc.anomalies.push("no graphics element".into());
    }
    desc
}

fn handle_element(
    e: &BytesStart,
    stack: &[Vec<u8>],
    disk_device: Option<DiskDevice>,
    desc: &mut DomainDescriptor,
    graphics_seen: &mut bool,
) {
    match e.local_name().as_ref() {
        // Only a <source> that is a direct child of <disk> counts; backing
        // chain sources sit deeper.
        b"source" if stack.last().map(Vec::as_slice) == Some(b"disk".as_slice()) => {
            if let Some(path) = attr(e, b"file") {
                desc.disks.push(DiskSource {
                    path,
                    device: disk_device.unwrap_or(DiskDevice::Disk),
                });
            }
        }
        b"graphics" if !*graphics_seen => {
            *graphics_seen = true;
            let ty = attr(e, b"type");
            desc.graphics = GraphicsKind::from_type_attr(ty.as_deref());
            desc.graphics_type_attr = ty;
        }
        _ => {}
    }
}

fn attr(e: &BytesStart, key: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.local_name().as_ref() == key)
        .and_then(|a| a.unescape_value().ok().map(|v| v.into_owned()))
}
