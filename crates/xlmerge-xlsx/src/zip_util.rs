use std::io::Read;

use crate::XlsxError;

/// Default maximum uncompressed size permitted for any single ZIP part inflated into memory.
///
/// Guards against ZIP bombs (tiny compressed size, huge uncompressed size) and forged ZIP
/// metadata (e.g. an incorrect `uncompressed_size` field).
pub(crate) const DEFAULT_MAX_ZIP_PART_BYTES: u64 = 256 * 1024 * 1024; // 256MiB

/// Default maximum total uncompressed bytes permitted across all parts of one package.
pub(crate) const DEFAULT_MAX_ZIP_TOTAL_BYTES: u64 = 512 * 1024 * 1024; // 512MiB

pub(crate) struct ZipInflateBudget {
    max_total_bytes: u64,
    used_bytes: u64,
}

impl ZipInflateBudget {
    pub(crate) fn new(max_total_bytes: u64) -> Self {
        Self {
            max_total_bytes,
            used_bytes: 0,
        }
    }

    fn remaining_bytes(&self) -> u64 {
        self.max_total_bytes.saturating_sub(self.used_bytes)
    }

    fn consume(&mut self, bytes: u64) -> Result<(), XlsxError> {
        self.used_bytes = self.used_bytes.saturating_add(bytes);
        if self.used_bytes > self.max_total_bytes {
            return Err(XlsxError::PackageTooLarge {
                total: self.used_bytes,
                max: self.max_total_bytes,
            });
        }
        Ok(())
    }
}

/// Read a ZIP entry into memory with a per-part limit and a package-wide budget.
///
/// `declared_size` is the entry's recorded uncompressed size and only serves as a fast path;
/// the read itself is capped at `limit + 1` bytes so forged metadata cannot bypass the limit.
pub(crate) fn read_zip_file_bytes_with_budget<R: Read>(
    file: R,
    declared_size: u64,
    part: &str,
    max_part_bytes: u64,
    budget: &mut ZipInflateBudget,
) -> Result<Vec<u8>, XlsxError> {
    if declared_size > max_part_bytes {
        return Err(XlsxError::PartTooLarge {
            part: part.to_string(),
            size: declared_size,
            max: max_part_bytes,
        });
    }

    let effective_max = max_part_bytes.min(budget.remaining_bytes());
    let mut buf = Vec::new();
    file.take(effective_max.saturating_add(1))
        .read_to_end(&mut buf)?;

    let read = buf.len() as u64;
    if read > max_part_bytes {
        return Err(XlsxError::PartTooLarge {
            part: part.to_string(),
            size: read,
            max: max_part_bytes,
        });
    }
    budget.consume(read)?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::{Cursor, Write};

    use zip::write::FileOptions;
    use zip::{ZipArchive, ZipWriter};

    fn build_zip(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let cursor = Cursor::new(Vec::new());
        let mut zip = ZipWriter::new(cursor);
        let options =
            FileOptions::<()>::default().compression_method(zip::CompressionMethod::Deflated);
        for (name, bytes) in entries {
            zip.start_file(*name, options).unwrap();
            zip.write_all(bytes).unwrap();
        }
        zip.finish().unwrap().into_inner()
    }

    #[test]
    fn part_limit_is_enforced() {
        let bytes = build_zip(&[("a.txt", b"hello world")]); // 11 bytes
        let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
        let mut budget = ZipInflateBudget::new(1024);

        let mut file = archive.by_index(0).unwrap();
        let size = file.size();
        let err =
            read_zip_file_bytes_with_budget(&mut file, size, "a.txt", 10, &mut budget).unwrap_err();
        match err {
            XlsxError::PartTooLarge { part, .. } => assert_eq!(part, "a.txt"),
            other => panic!("expected PartTooLarge, got {other:?}"),
        }
    }

    #[test]
    fn package_budget_is_shared_across_parts() {
        let bytes = build_zip(&[("a.txt", b"hello"), ("b.txt", b"world")]);
        let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
        let mut budget = ZipInflateBudget::new(8);

        {
            let mut a = archive.by_index(0).unwrap();
            let size = a.size();
            let part =
                read_zip_file_bytes_with_budget(&mut a, size, "a.txt", 64, &mut budget).unwrap();
            assert_eq!(part, b"hello");
        }
        let mut b = archive.by_index(1).unwrap();
        let size = b.size();
        let err =
            read_zip_file_bytes_with_budget(&mut b, size, "b.txt", 64, &mut budget).unwrap_err();
        assert!(matches!(err, XlsxError::PackageTooLarge { .. }));
    }
}
