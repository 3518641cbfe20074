//! Immutable snapshot of the machine's disks, partitions and volumes
//!
//! Built once by the enumeration pass and then only read. Partitions live
//! in a single arena keyed by [`PartitionId`]; each disk holds the keys of
//! its own partitions and the flat lookups run over the same arena.

use super::entities::{Disk, Partition, PartitionId, Volume};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default)]
pub struct Catalog {
    disks: Vec<Disk>,
    partitions: BTreeMap<PartitionId, Partition>,
    volumes: Vec<Volume>,
}

impl Catalog {
    /// Assembles a snapshot from already-validated records
    ///
    /// Each disk's partition key list is rebuilt from the arena, so callers
    /// only need to supply the partition records.
    pub fn new(mut disks: Vec<Disk>, partitions: Vec<Partition>, volumes: Vec<Volume>) -> Self {
        let partitions: BTreeMap<PartitionId, Partition> =
            partitions.into_iter().map(|p| (p.id(), p)).collect();

        for disk in &mut disks {
            disk.partitions = partitions
                .values()
                .filter(|p| p.disk == disk.number)
                .map(Partition::id)
                .collect();
        }

        Self {
            disks,
            partitions,
            volumes,
        }
    }

    pub fn disks(&self) -> &[Disk] {
        &self.disks
    }

    pub fn volumes(&self) -> &[Volume] {
        &self.volumes
    }

    pub fn partitions(&self) -> impl Iterator<Item = &Partition> {
        self.partitions.values()
    }

    pub fn disk(&self, number: u32) -> Option<&Disk> {
        self.disks.iter().find(|d| d.number == number)
    }

    pub fn partition(&self, id: PartitionId) -> Option<&Partition> {
        self.partitions.get(&id)
    }

    pub fn partitions_of<'a>(&'a self, disk: &'a Disk) -> impl Iterator<Item = &'a Partition> {
        disk.partitions.iter().filter_map(|id| self.partitions.get(id))
    }

    /// The partition starting exactly at `offset` on `disk`
    pub fn partition_at(&self, disk: u32, offset: u64) -> Option<&Partition> {
        self.partitions
            .values()
            .find(|p| p.disk == disk && p.offset == offset)
    }

    /// Every volume with at least one extent on `disk`
    pub fn volumes_on_disk(&self, disk: u32) -> impl Iterator<Item = &Volume> {
        self.volumes.iter().filter(move |v| v.is_on_disk(disk))
    }

    /// Largest sector size among the disks backing `volume`
    pub fn sector_size_of(&self, volume: &Volume) -> Option<u32> {
        volume
            .extents
            .iter()
            .filter_map(|e| self.disk(e.disk))
            .map(|d| d.sector_size)
            .max()
    }
}
