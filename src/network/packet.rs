use serde::Serialize;

use crate::network::{Component, CoreId};
use crate::timeq::Cycle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Destination {
    Core(CoreId),
    Broadcast,
}

impl Destination {
    pub fn is_broadcast(&self) -> bool {
        matches!(self, Self::Broadcast)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum PacketType {
    User,
    SharedMem1,
    SharedMem2,
    System,
}

impl PacketType {
    pub fn is_shared_memory(self) -> bool {
        matches!(self, Self::SharedMem1 | Self::SharedMem2)
    }
}

/// A network packet as seen by the models. Ownership stays with the enclosing router.
#[derive(Debug, Clone)]
pub struct Packet {
    pub sender: CoreId,
    pub receiver: Destination,
    pub packet_type: PacketType,
    // payload bytes
    pub length: u32,
    pub data: Vec<u8>,
    pub start_time: Cycle,
    pub time: Cycle,
    pub specific: Option<Component>,
}

impl Packet {
    pub fn new(
        sender: CoreId,
        receiver: Destination,
        packet_type: PacketType,
        length: u32,
        time: Cycle,
    ) -> Self {
        Self {
            sender,
            receiver,
            packet_type,
            length,
            data: Vec::new(),
            start_time: time,
            time,
            specific: None,
        }
    }

    pub fn with_data(mut self, data: Vec<u8>) -> Self {
        self.data = data;
        self
    }

    /// Bytes counted for bandwidth and serialization. Shared-memory messages already report
    /// their modeled size; every other packet also carries a network header.
    pub fn modeled_length(&self, header_bytes: u32) -> u32 {
        if self.packet_type.is_shared_memory() {
            self.length
        } else {
            self.length.saturating_add(header_bytes)
        }
    }
}

/// Core on whose behalf shared-memory traffic travels, as known to the memory manager.
pub trait RequesterResolver: Send + Sync {
    fn shmem_requester(&self, packet: &Packet) -> CoreId;
}

/// Resolver for systems without a memory manager: every packet is charged to its sender.
#[derive(Debug, Clone, Copy, Default)]
pub struct SenderIsRequester;

impl RequesterResolver for SenderIsRequester {
    fn shmem_requester(&self, packet: &Packet) -> CoreId {
        packet.sender
    }
}

/// Resolver for shared-memory messages that lead with the requester id as a little-endian u32.
#[derive(Debug, Clone, Copy, Default)]
pub struct ShmemHeaderResolver;

impl RequesterResolver for ShmemHeaderResolver {
    fn shmem_requester(&self, packet: &Packet) -> CoreId {
        match packet.data.get(..4) {
            Some(bytes) => u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as CoreId,
            None => packet.sender,
        }
    }
}

/// Encodes `requester` the way [`ShmemHeaderResolver`] reads it.
pub fn shmem_header(requester: CoreId) -> Vec<u8> {
    (requester as u32).to_le_bytes().to_vec()
}
