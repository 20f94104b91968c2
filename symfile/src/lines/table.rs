//! Address-sorted line tables for one compile unit.

use super::*;
use crate::names::NamesStream;
use bstr::BString;

/// One row of a line table.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LineEntry {
    /// Virtual address of the first instruction of this row.
    pub address: u64,
    /// 1-based line number.
    pub line: u32,
    /// Index into [`LineTable::files`].
    pub file_index: u32,
    /// The row starts a statement.
    pub is_statement: bool,
    /// The row marks the end of a contiguous code range. It does not describe code itself.
    pub is_terminal: bool,
}

/// The line table of one compile unit.
#[derive(Clone, Debug, Default)]
pub struct LineTable {
    files: Vec<BString>,
    entries: Vec<LineEntry>,
}

impl LineTable {
    /// Builds the line table from the C13 Line Data of a module.
    ///
    /// `address_of` converts a `(segment, offset)` pair to a virtual address. Contributions whose
    /// address cannot be computed are skipped.
    pub fn build<S: AsRef<[u8]>>(
        c13_line_data: &[u8],
        names: &NamesStream<S>,
        mut address_of: impl FnMut(u16, u32) -> Option<u64>,
    ) -> anyhow::Result<Self> {
        let mut table = Self::default();

        let checksums = SubsectionIter::new(c13_line_data)
            .find(|s| s.kind == SubsectionKind::FILE_CHECKSUMS)
            .map(|s| FileChecksumsSubsection::new(s.data));

        // Maps file_index (offset into FILE_CHECKSUMS) to an index into `files`.
        let mut file_map: Vec<(u32, u32)> = Vec::new();

        for subsection in SubsectionIter::new(c13_line_data) {
            if subsection.kind != SubsectionKind::LINES {
                continue;
            }

            let Some(checksums) = &checksums else {
                anyhow::bail!(
                    "This C13 Line Data substream contains LINES subsections, but does not contain a FILE_CHECKSUMS subsection."
                );
            };

            let lines = LinesSubsection::parse(subsection.data)?;
            let contribution = lines.contribution;
            let segment = contribution.contribution_segment.get();
            let Some(base) = address_of(segment, contribution.contribution_offset.get()) else {
                trace!(segment, "skipping line contribution with no virtual address");
                continue;
            };

            let mut last: Option<(u32, u32)> = None;

            for block in lines.blocks() {
                let checksum_offset = block.header.file_index.get();
                let file_index = match file_map.iter().find(|(k, _)| *k == checksum_offset) {
                    Some(&(_, i)) => i,
                    None => {
                        let file = checksums.get_file(checksum_offset)?;
                        let name = names.get_string(file.name())?;
                        let i = match table.files.iter().position(|f| f == name) {
                            Some(i) => i as u32,
                            None => {
                                table.files.push(name.to_owned());
                                (table.files.len() - 1) as u32
                            }
                        };
                        file_map.push((checksum_offset, i));
                        i
                    }
                };

                for line in block.lines() {
                    let line_num = line.line_num_start();
                    if is_jmc_line(line_num) {
                        continue;
                    }
                    table.entries.push(LineEntry {
                        address: base.wrapping_add(line.offset.get() as u64),
                        line: line_num,
                        file_index,
                        is_statement: line.statement(),
                        is_terminal: false,
                    });
                    last = Some((file_index, line_num));
                }
            }

            if let Some((file_index, line)) = last {
                table.entries.push(LineEntry {
                    address: base.wrapping_add(contribution.contribution_size.get() as u64),
                    line,
                    file_index,
                    is_statement: false,
                    is_terminal: true,
                });
            }
        }

        // At equal addresses, the end of one sequence sorts before the start of the next.
        table
            .entries
            .sort_by_key(|e| (e.address, !e.is_terminal));

        Ok(table)
    }

    /// The source files referenced by the entries.
    pub fn files(&self) -> &[BString] {
        &self.files
    }

    /// The entries, sorted by address.
    pub fn entries(&self) -> &[LineEntry] {
        &self.entries
    }

    /// The file name of an entry.
    pub fn file_name(&self, entry: &LineEntry) -> Option<&BString> {
        self.files.get(entry.file_index as usize)
    }

    /// Returns `true` if the table has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Finds the entry that covers `address`: the last entry at or below it, unless that entry
    /// ends a sequence.
    pub fn find_entry_by_address(&self, address: u64) -> Option<&LineEntry> {
        let n = self.entries.partition_point(|e| e.address <= address);
        let entry = self.entries.get(n.checked_sub(1)?)?;
        if entry.is_terminal {
            None
        } else {
            Some(entry)
        }
    }
}

/// Lists the source files named in the `FILE_CHECKSUMS` subsection, in subsection order. This
/// includes files that no `LINES` row refers to, such as headers that only declare things.
pub fn support_files<S: AsRef<[u8]>>(
    c13_line_data: &[u8],
    names: &NamesStream<S>,
) -> anyhow::Result<Vec<BString>> {
    let mut files: Vec<BString> = Vec::new();
    for subsection in SubsectionIter::new(c13_line_data) {
        if subsection.kind != SubsectionKind::FILE_CHECKSUMS {
            continue;
        }
        for file in FileChecksumsSubsection::new(subsection.data).iter() {
            let name = names.get_string(file.name())?;
            if !files.iter().any(|f| f == name) {
                files.push(name.to_owned());
            }
        }
    }
    Ok(files)
}
