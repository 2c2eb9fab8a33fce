//! Resolution of owner and group indices

use crate::errors::{IdError, Result};
use crate::metadata::MetablockReader;
use crate::table::Table;
use positioned_io::ReadAt;
use repr::uid_gid::{Entry, Id, Idx};

/// Maps the id indices stored in inodes to real user and group ids
pub trait IdResolver {
    fn resolve(&self, idx: Idx) -> Result<Id>;
}

impl<T: IdResolver + ?Sized> IdResolver for &T {
    fn resolve(&self, idx: Idx) -> Result<Id> {
        (**self).resolve(idx)
    }
}

/// The id lookup table of an archive
#[derive(Debug)]
pub struct IdTable<R> {
    table: Table<R, Entry>,
}

impl<R: ReadAt> IdTable<R> {
    pub fn new(reader: MetablockReader<R>, start: u64, count: u16) -> Self {
        Self {
            table: Table::new(reader, start, count.into()),
        }
    }
}

impl<R: ReadAt> IdResolver for IdTable<R> {
    fn resolve(&self, idx: Idx) -> Result<Id> {
        match self.table.get(idx.0.into())? {
            Some(entry) => Ok(entry.id()),
            None => Err(IdError::OutOfRange {
                idx: idx.0,
                count: self.table.len() as u16,
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
    fn resolves_ids() {
        let ids = [0u32, 1000, 65534];
        let entries: Vec<Entry> = ids.iter().map(|&id| Entry(repr::Le32::new(id))).collect();
        let mut image = Vec::new();
        let start = push_table(&mut image, &entries);

        let table = IdTable::new(reader(image), start, 3);
        assert_eq!(table.resolve(Idx(1)).unwrap(), Id(1000));
        assert_eq!(table.resolve(Idx(2)).unwrap(), Id(65534));
        match table.resolve(Idx(3)) {
            Err(Error::Id(IdError::OutOfRange { idx: 3, count: 3 })) => {}
            other => panic!("unexpected {:?}", other),
        }
    }
}
