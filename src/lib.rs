//! Reading inodes out of squashfs archives
//!
//! An inode is located by a 48 bit [`Ref`](repr::inode::Ref) into the inode table. Decoding one
//! reads its record through a [`MetadataSource`](metadata::MetadataSource), resolves its owner
//! through an [`IdResolver`](ids::IdResolver) and the location of its tail fragment through a
//! [`FragmentResolver`](fragments::FragmentResolver).
//!
//! [`Archive`] wires all of these to a real image, and hands out decoded inodes through an
//! [`InodeCache`] which decodes each inode number only once.

pub mod cache;
pub mod compression;
pub mod config;
pub mod errors;
pub mod fragments;
pub mod ids;
pub mod inode;
pub mod metadata;
mod read;
pub mod table;

pub use cache::{InodeCache, InodeLoader};
pub use config::Config;
pub use errors::{Error, Result};
pub use inode::{Decoder, Inode, InodeData};
pub use read::{Archive, ArchiveDecoder};
pub use repr;
