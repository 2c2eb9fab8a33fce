//! Resolution of fragment indices

use crate::errors::{FragmentError, Result};
use crate::metadata::MetablockReader;
use crate::table::Table;
use positioned_io::ReadAt;
use repr::datablock;
use repr::fragment::{Entry, Idx};

/// Where a fragment block is stored
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct FragmentLocation {
    pub start: datablock::Ref,
    /// On-disk size, carrying the "stored uncompressed" flag
    pub size: datablock::Size,
}

/// Maps the fragment indices stored in file inodes to fragment block locations
pub trait FragmentResolver {
    fn resolve(&self, idx: Idx) -> Result<FragmentLocation>;
}

impl<T: FragmentResolver + ?Sized> FragmentResolver for &T {
    fn resolve(&self, idx: Idx) -> Result<FragmentLocation> {
        (**self).resolve(idx)
    }
}

/// The fragment table of an archive
#[derive(Debug)]
pub struct FragmentTable<R> {
    table: Table<R, Entry>,
}

impl<R: ReadAt> FragmentTable<R> {
    pub fn new(reader: MetablockReader<R>, start: u64, count: u32) -> Self {
        Self {
            table: Table::new(reader, start, count),
        }
    }
}

impl<R: ReadAt> FragmentResolver for FragmentTable<R> {
    fn resolve(&self, idx: Idx) -> Result<FragmentLocation> {
        match self.table.get(idx.0)? {
            Some(entry) => Ok(FragmentLocation {
                start: entry.start(),
                size: entry.size(),
            }),
            None => Err(FragmentError::OutOfRange {
                idx: idx.0,
                count: self.table.len(),
            }
            .into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::Error;
    use crate::metadata::tests::reader;
    use crate::table::tests::push_table;

    #[test]
    fn resolves_fragments() {
        let entries = [
            Entry::new(datablock::Ref(96), datablock::Size::new(1200, false)),
            Entry::new(datablock::Ref(1296), datablock::Size::new(4096, true)),
        ];
        let mut image = Vec::new();
        let start = push_table(&mut image, &entries);

        let table = FragmentTable::new(reader(image), start, 2);
        let location = table.resolve(Idx(1)).unwrap();
        assert_eq!(location.start, datablock::Ref(1296));
        assert_eq!(location.size.size(), 4096);
        assert!(location.size.uncompressed());

        match table.resolve(Idx::INVALID) {
            Err(Error::Fragment(FragmentError::OutOfRange { count: 2, .. })) => {}
            other => panic!("unexpected {:?}", other),
        }
    }
}
