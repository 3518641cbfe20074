//! Safe-open protocol tests
//!
//! The in-memory backend records every control call, so the order in which
//! aliasing volumes and disks are opened, locked and dismounted is asserted
//! directly.

mod common;

use common::*;
use rawdev::application::SafeOpener;
use rawdev::domain::repositories::{DeviceControl, Intent};
use rawdev::domain::services::Resolver;
use rawdev::error::{DeviceError, Phase};
use rawdev::infrastructure::{DeviceCall, MemoryDevices, MemoryDisk, MemoryHandle};
use rstest::*;
use std::cell::RefCell;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::rc::Rc;

fn open_device(path: &str, intent: Intent) -> DeviceCall {
    DeviceCall::OpenDevice {
        path: path.to_string(),
        intent,
    }
}

fn lock(path: &str) -> DeviceCall {
    DeviceCall::Lock(path.to_string())
}

fn extended_io(path: &str) -> DeviceCall {
    DeviceCall::ExtendedIo(path.to_string())
}

fn dismount(path: &str) -> DeviceCall {
    DeviceCall::Dismount(path.to_string())
}

#[fixture]
fn devices() -> MemoryDevices {
    machine()
}

#[rstest]
fn test_disk_write_locks_every_aliasing_volume_first(devices: MemoryDevices) {
    let catalog = catalog_of(&devices);
    let target = Resolver::new(&catalog).resolve(DISK0);

    let opened = SafeOpener::new(&catalog, &devices)
        .open(&target, Intent::Write)
        .unwrap();

    assert_eq!(opened.held_volumes(), 2);
    assert_eq!(
        devices.calls(),
        vec![
            open_device(&device_path(SYSTEM), Intent::Write),
            lock(&device_path(SYSTEM)),
            extended_io(&device_path(SYSTEM)),
            open_device(&device_path(SPANNED), Intent::Write),
            lock(&device_path(SPANNED)),
            extended_io(&device_path(SPANNED)),
            open_device(DISK0, Intent::Write),
            dismount(DISK0),
            lock(DISK0),
        ]
    );
}

#[rstest]
fn test_spanned_and_unformatted_volumes_alias_second_disk(devices: MemoryDevices) {
    let catalog = catalog_of(&devices);
    let target = Resolver::new(&catalog).resolve(DISK1);

    SafeOpener::new(&catalog, &devices)
        .open(&target, Intent::Write)
        .unwrap();

    // The RAW volume is locked but gets no extended I/O request.
    assert_eq!(
        devices.calls(),
        vec![
            open_device(&device_path(SPANNED), Intent::Write),
            lock(&device_path(SPANNED)),
            extended_io(&device_path(SPANNED)),
            open_device(&device_path(UNFORMATTED), Intent::Write),
            lock(&device_path(UNFORMATTED)),
            open_device(DISK1, Intent::Write),
            dismount(DISK1),
            lock(DISK1),
        ]
    );
}

#[test]
fn test_disk_without_volumes_is_still_dismounted_and_locked() {
    let devices = MemoryDevices::new().with_disk(MemoryDisk::new(0, 4096));
    let catalog = catalog_of(&devices);
    let target = Resolver::new(&catalog).resolve(DISK0);

    let opened = SafeOpener::new(&catalog, &devices)
        .open(&target, Intent::Write)
        .unwrap();

    assert_eq!(opened.held_volumes(), 0);
    assert_eq!(
        devices.calls(),
        vec![open_device(DISK0, Intent::Write), dismount(DISK0), lock(DISK0)]
    );
}

#[rstest]
fn test_disk_read_takes_no_locks(devices: MemoryDevices) {
    let catalog = catalog_of(&devices);
    let target = Resolver::new(&catalog).resolve(DISK0);

    let opened = SafeOpener::new(&catalog, &devices)
        .open(&target, Intent::Read)
        .unwrap();

    assert_eq!(opened.size(), DISK0_SIZE as u64);
    assert_eq!(opened.alignment(), 512);
    assert_eq!(devices.calls(), vec![open_device(DISK0, Intent::Read)]);
}

#[rstest]
fn test_volume_open_locks_and_extends(devices: MemoryDevices) {
    let catalog = catalog_of(&devices);
    let target = Resolver::new(&catalog).resolve(r"c:\");

    let opened = SafeOpener::new(&catalog, &devices)
        .open(&target, Intent::Read)
        .unwrap();

    assert_eq!(opened.size(), PARTITION1_SIZE);
    assert_eq!(
        devices.calls(),
        vec![
            open_device(&device_path(SYSTEM), Intent::Read),
            lock(&device_path(SYSTEM)),
            extended_io(&device_path(SYSTEM)),
        ]
    );
}

#[rstest]
#[case::volume_lock(lock(&device_path(SPANNED)), Phase::Lock, SPANNED)]
#[case::disk_dismount(dismount(DISK0), Phase::Dismount, DISK0)]
#[case::disk_lock(lock(DISK0), Phase::Lock, DISK0)]
#[case::extended_io(extended_io(&device_path(SYSTEM)), Phase::ExtendedIo, SYSTEM)]
fn test_refusal_aborts_with_phase_and_code(
    #[case] refused: DeviceCall,
    #[case] phase: Phase,
    #[case] failing_target: &str,
) {
    let devices = machine().failing(refused.clone(), 33);
    let catalog = catalog_of(&devices);
    let target = Resolver::new(&catalog).resolve(DISK0);

    let err = SafeOpener::new(&catalog, &devices)
        .open(&target, Intent::Write)
        .err()
        .unwrap();

    assert_eq!(err.phase(), Some(phase));
    assert_eq!(err.os_code(), Some(33));
    match err {
        DeviceError::Os { target, .. } => assert_eq!(target, failing_target),
        other => panic!("unexpected error: {other:?}"),
    }
    // Nothing is attempted after the refused call.
    assert_eq!(devices.calls().last(), Some(&refused));
}

#[rstest]
fn test_volume_lock_refusal_keeps_disk_closed(devices: MemoryDevices) {
    let devices = devices.failing(lock(&device_path(SYSTEM)), 5);
    let catalog = catalog_of(&devices);
    let target = Resolver::new(&catalog).resolve(DISK0);

    assert!(
        SafeOpener::new(&catalog, &devices)
            .open(&target, Intent::Write)
            .is_err()
    );
    assert!(!devices.calls().contains(&open_device(DISK0, Intent::Write)));
}

#[rstest]
fn test_partition_opens_owning_disk_at_partition_start(devices: MemoryDevices) {
    let catalog = catalog_of(&devices);
    let target = Resolver::new(&catalog).resolve(PARTITION2);

    let mut opened = SafeOpener::new(&catalog, &devices)
        .open(&target, Intent::Write)
        .unwrap();
    assert_eq!(opened.size(), PARTITION2_SIZE);
    assert_eq!(opened.capacity(), Some(PARTITION2_SIZE));
    assert_eq!(opened.held_volumes(), 2);
    assert!(devices.calls().contains(&dismount(DISK0)));

    opened.handle_mut().write_all(&[0xEE; 512]).unwrap();
    drop(opened);

    let disk = devices.disk_bytes(0).unwrap();
    let start = PARTITION2_OFFSET as usize;
    assert!(disk[start..start + 512].iter().all(|&b| b == 0xEE));
    assert_eq!(disk[start - 1], disk0_byte(start - 1));
    assert_eq!(disk[start + 512], disk0_byte(start + 512));
}

#[rstest]
fn test_range_and_alignment_checks(devices: MemoryDevices) {
    let catalog = catalog_of(&devices);
    let target = Resolver::new(&catalog).resolve(PARTITION1);
    let mut opened = SafeOpener::new(&catalog, &devices)
        .open(&target, Intent::Read)
        .unwrap();

    assert!(opened.check_range(0, PARTITION1_SIZE).is_ok());
    assert!(matches!(
        opened.check_range(512, PARTITION1_SIZE),
        Err(DeviceError::OutOfRange { capacity, .. }) if capacity == PARTITION1_SIZE
    ));
    assert!(matches!(
        opened.check_range(u64::MAX, 1),
        Err(DeviceError::OutOfRange { .. })
    ));
    assert!(matches!(
        opened.seek_to(100),
        Err(DeviceError::Misaligned { value: 100, alignment: 512, .. })
    ));
    assert!(opened.seek_to(1024).is_ok());
}

/// Wraps the memory backend and records handle paths as they close
struct ClosingDevices<'a> {
    inner: &'a MemoryDevices,
    closed: Rc<RefCell<Vec<String>>>,
}

struct ClosingHandle {
    inner: MemoryHandle,
    closed: Rc<RefCell<Vec<String>>>,
}

impl Drop for ClosingHandle {
    fn drop(&mut self) {
        self.closed.borrow_mut().push(self.inner.path().to_string());
    }
}

impl Read for ClosingHandle {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

impl Write for ClosingHandle {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl Seek for ClosingHandle {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.inner.seek(pos)
    }
}

impl ClosingDevices<'_> {
    fn wrap(&self, inner: MemoryHandle) -> ClosingHandle {
        ClosingHandle {
            inner,
            closed: Rc::clone(&self.closed),
        }
    }
}

impl DeviceControl for ClosingDevices<'_> {
    type Handle = ClosingHandle;

    fn open_device(&self, path: &str, intent: Intent) -> io::Result<ClosingHandle> {
        self.inner.open_device(path, intent).map(|h| self.wrap(h))
    }

    fn open_file(&self, path: &str, intent: Intent) -> io::Result<ClosingHandle> {
        self.inner.open_file(path, intent).map(|h| self.wrap(h))
    }

    fn lock(&self, handle: &ClosingHandle) -> io::Result<()> {
        self.inner.lock(&handle.inner)
    }

    fn dismount(&self, handle: &ClosingHandle) -> io::Result<()> {
        self.inner.dismount(&handle.inner)
    }

    fn allow_extended_io(&self, handle: &ClosingHandle) -> io::Result<()> {
        self.inner.allow_extended_io(&handle.inner)
    }

    fn file_size(&self, handle: &ClosingHandle) -> io::Result<u64> {
        self.inner.file_size(&handle.inner)
    }
}

#[rstest]
fn test_disk_closes_before_volumes_in_reverse_order(devices: MemoryDevices) {
    let catalog = catalog_of(&devices);
    let target = Resolver::new(&catalog).resolve(DISK0);
    let control = ClosingDevices {
        inner: &devices,
        closed: Rc::default(),
    };

    let opened = SafeOpener::new(&catalog, &control)
        .open(&target, Intent::Write)
        .unwrap();
    assert!(control.closed.borrow().is_empty());
    drop(opened);

    assert_eq!(
        *control.closed.borrow(),
        vec![DISK0.to_string(), device_path(SPANNED), device_path(SYSTEM)]
    );
}
