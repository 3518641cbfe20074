//! Text listings of the catalog for `-lv` and `-lp`

use crate::domain::Catalog;
use crate::domain::entities::Volume;
use std::fmt::Write;

const MIB: u64 = 1024 * 1024;
const GIB: u64 = 1024 * MIB;

/// One block per volume; zero-size volumes only when `include_all`
pub fn format_volume_listing(catalog: &Catalog, include_all: bool) -> String {
    let mut out = String::new();
    for volume in catalog.volumes() {
        if !volume.is_accessible() && !include_all {
            continue;
        }
        write_volume(&mut out, catalog, volume);
    }
    out
}

fn write_volume(out: &mut String, catalog: &Catalog, volume: &Volume) {
    // Writing into a String cannot fail.
    let _ = writeln!(out, "{}", volume.device_name.as_deref().unwrap_or("-"));
    let _ = writeln!(out, "{}", volume.name);
    let _ = writeln!(
        out,
        "Volume size: {} GB, {} MB, {} bytes",
        volume.size / GIB,
        volume.size / MIB,
        volume.size
    );
    for path in &volume.mount_paths {
        let _ = writeln!(out, "Path: {}", path);
    }
    if let Some(label) = &volume.label {
        let _ = writeln!(out, "Label: {}", label);
    }
    if let Some(file_system) = &volume.file_system {
        let _ = writeln!(out, "FileSystem: {}", file_system);
    }
    for extent in &volume.extents {
        let disk = catalog
            .disk(extent.disk)
            .map_or_else(|| format!("disk {}", extent.disk), |disk| disk.path.clone());
        let aligned = if catalog.partition_at(extent.disk, extent.offset).is_some() {
            "aligned with partition"
        } else {
            "not aligned with partition"
        };
        let _ = writeln!(
            out,
            "{}  offset={}  size={}  ({})",
            disk, extent.offset, extent.length, aligned
        );
    }
    out.push('\n');
}

/// One line per disk followed by one line per partition
pub fn format_disk_listing(catalog: &Catalog) -> String {
    let mut out = String::new();
    for disk in catalog.disks() {
        let _ = writeln!(
            out,
            "{:<35}{:>20} bytes   {:<9}  {}",
            disk.path,
            disk.size,
            disk.media.to_string(),
            disk.style
        );
        for partition in catalog.partitions_of(disk) {
            let _ = writeln!(
                out,
                "{:<35}{:>20} bytes   offset={}",
                partition.path, partition.size, partition.offset
            );
        }
    }
    out
}
