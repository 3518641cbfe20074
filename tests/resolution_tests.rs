//! Name resolution and file fallback tests

mod common;

use common::*;
use rawdev::application::dto::CopyOptions;
use rawdev::application::{CopyDeviceUseCase, CopyStage};
use rawdev::domain::services::{Resolver, Target};
use rawdev::infrastructure::{MemoryDevices, MemoryVolume};
use rstest::*;
use tempfile::{NamedTempFile, TempDir};

#[rstest]
#[case::volume_name(SYSTEM, "volume", SYSTEM)]
#[case::volume_name_other_case(r"\\?\VOLUME{1111}\", "volume", SYSTEM)]
#[case::mount_path(r"c:\", "volume", SYSTEM)]
#[case::device_name(r"\device\harddiskvolume2", "volume", SPANNED)]
#[case::disk_path(DISK1, "disk", DISK1)]
#[case::disk_number("1", "disk", DISK1)]
#[case::partition_path(PARTITION2, "partition", PARTITION2)]
#[case::file(r"c:\temp\drive0.part1.bin", "file", r"c:\temp\drive0.part1.bin")]
#[case::volume_name_prefix(r"\\?\Volume{11", "file", r"\\?\Volume{11")]
#[case::unknown_disk_number("9", "file", "9")]
fn test_resolution(#[case] name: &str, #[case] kind: &str, #[case] resolved: &str) {
    let devices = machine();
    let catalog = catalog_of(&devices);
    let target = Resolver::new(&catalog).resolve(name);

    assert_eq!(target.kind(), kind);
    assert_eq!(target.to_string(), resolved);
}

#[test]
fn test_partition_by_disk_and_offset() {
    let devices = machine();
    let catalog = catalog_of(&devices);
    let resolver = Resolver::new(&catalog);

    let partition = resolver.find_partition_at(0, PARTITION1_OFFSET).unwrap();
    assert_eq!(partition.path, PARTITION1);
    assert!(resolver.find_partition_at(0, PARTITION1_OFFSET + 512).is_none());
}

#[test]
fn test_volume_wins_over_existing_file() {
    let file = NamedTempFile::new().unwrap();
    let path = file.path().to_str().unwrap().to_string();
    let devices = machine().with_volume(
        MemoryVolume::new(r"\\?\Volume{5555}\")
            .mount_path(path.clone())
            .extent(1, 0, 512),
    );
    let catalog = catalog_of(&devices);

    let target = Resolver::new(&catalog).resolve(&path);
    assert!(matches!(target, Target::Volume(volume) if volume.name == r"\\?\Volume{5555}\"));
}

#[test]
fn test_unknown_destination_is_created_as_file() {
    let devices: MemoryDevices = machine().with_file("in.bin", vec![7; 1000]);
    let catalog = catalog_of(&devices);

    CopyDeviceUseCase::new(&catalog, &devices)
        .execute(&CopyOptions::new("in.bin", "fresh.bin"), |_| {})
        .unwrap();

    assert_eq!(devices.file("fresh.bin").unwrap(), vec![7; 1000]);
}

#[cfg(target_os = "linux")]
mod on_disk {
    use super::*;
    use rawdev::domain::Catalog;
    use rawdev::infrastructure::LinuxDevices;
    use std::fs;

    fn copy_files(source: &str, destination: &str) -> Result<u64, CopyStage> {
        let catalog = Catalog::default();
        let devices = LinuxDevices::new();
        CopyDeviceUseCase::new(&catalog, &devices)
            .execute(&CopyOptions::new(source, destination), |_| {})
            .map(|report| report.bytes_copied)
            .map_err(|failure| failure.stage)
    }

    #[fixture]
    fn workspace() -> TempDir {
        TempDir::new().unwrap()
    }

    #[rstest]
    fn test_write_creates_and_truncates(workspace: TempDir) {
        let source = workspace.path().join("source.bin");
        let destination = workspace.path().join("destination.bin");
        let data: Vec<u8> = (0..=255u8).cycle().take(10_000).collect();
        fs::write(&source, &data).unwrap();
        fs::write(&destination, vec![0xFF; 50_000]).unwrap();

        let copied = copy_files(source.to_str().unwrap(), destination.to_str().unwrap()).unwrap();

        assert_eq!(copied, 10_000);
        assert_eq!(fs::read(&destination).unwrap(), data);
    }

    #[rstest]
    fn test_missing_source_is_not_found(workspace: TempDir) {
        let source = workspace.path().join("missing.bin");
        let destination = workspace.path().join("out.bin");

        let stage =
            copy_files(source.to_str().unwrap(), destination.to_str().unwrap()).unwrap_err();

        assert_eq!(stage, CopyStage::OpenSource);
        assert!(!destination.exists());
    }
}
