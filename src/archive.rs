use crate::record::Record;
use crate::RegroupError;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

/// Header written at the start of every archive file.
const MAGIC: &[u8; 8] = b"RGARC\0\0\x01";

/// Sequential access to the records of one archive.
pub trait RecordSource<R> {
    /// Total number of records in the archive.
    fn len(&self) -> usize;
    fn has_next(&self) -> bool;
    fn next_record(&mut self) -> Result<R, RegroupError>;

    /// Reads every remaining record.
    fn get_all(&mut self) -> Result<Vec<R>, RegroupError> {
        let mut records = Vec::new();
        while self.has_next() {
            records.push(self.next_record()?);
        }
        Ok(records)
    }
}

/// Incremental writing of records into one archive.
pub trait RecordSink<R> {
    fn add(&mut self, record: &R) -> Result<(), RegroupError>;

    /// Finalizes the archive and returns the number of records written.
    /// Writing zero records leaves no file behind, removing any archive an
    /// earlier writer left at the same path.
    fn finish(self) -> Result<usize, RegroupError>
    where
        Self: Sized;
}

/// Reads an archive file: a header followed by entries, each a little-endian
/// u32 length prefix and one bincode encoded record.
pub struct ReadingArchive<R> {
    path: PathBuf,
    reader: BufReader<File>,
    total: usize,
    remaining: usize,
    buffer: Vec<u8>,
    _record: PhantomData<fn() -> R>,
}

impl<R: Record> ReadingArchive<R> {
    /// Opens and validates an archive. The entry framing is checked up front so
    /// a truncated file fails here rather than halfway through a stage.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, RegroupError> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(RegroupError::NotFound(path.to_path_buf()));
        }

        let file = File::open(path)?;
        let file_len = file.metadata()?.len();
        let mut reader = BufReader::new(file);

        let mut magic = [0u8; 8];
        if file_len < MAGIC.len() as u64 {
            return Err(RegroupError::invalid_format(path, "missing archive header"));
        }
        reader.read_exact(&mut magic)?;
        if &magic != MAGIC {
            return Err(RegroupError::invalid_format(path, "not a record archive"));
        }

        let mut offset = MAGIC.len() as u64;
        let mut total = 0;
        while offset < file_len {
            if file_len - offset < 4 {
                return Err(RegroupError::invalid_format(path, "truncated length prefix"));
            }
            let mut len_bytes = [0u8; 4];
            reader.read_exact(&mut len_bytes)?;
            offset += 4;

            let len = u32::from_le_bytes(len_bytes) as u64;
            if file_len - offset < len {
                return Err(RegroupError::invalid_format(
                    path,
                    format!("entry {} is truncated", total),
                ));
            }
            reader.seek_relative(len as i64)?;
            offset += len;
            total += 1;
        }
        reader.seek(SeekFrom::Start(MAGIC.len() as u64))?;

        Ok(Self {
            path: path.to_path_buf(),
            reader,
            total,
            remaining: total,
            buffer: Vec::new(),
            _record: PhantomData,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl<R: Record> RecordSource<R> for ReadingArchive<R> {
    fn len(&self) -> usize {
        self.total
    }

    fn has_next(&self) -> bool {
        self.remaining > 0
    }

    fn next_record(&mut self) -> Result<R, RegroupError> {
        if self.remaining == 0 {
            return Err(RegroupError::Other(format!(
                "no more records in {}",
                self.path.display()
            )));
        }

        let mut len_bytes = [0u8; 4];
        self.reader.read_exact(&mut len_bytes)?;
        let len = u32::from_le_bytes(len_bytes) as usize;

        self.buffer.resize(len, 0);
        self.reader.read_exact(&mut self.buffer)?;

        let (record, used): (R, usize) =
            bincode::decode_from_slice(&self.buffer, bincode::config::standard())
                .map_err(|e| RegroupError::invalid_format(&self.path, e.to_string()))?;
        if used != len {
            return Err(RegroupError::invalid_format(
                &self.path,
                format!("entry {} has {} trailing bytes", self.total - self.remaining, len - used),
            ));
        }

        self.remaining -= 1;
        Ok(record)
    }
}

impl<R: Record> Iterator for ReadingArchive<R> {
    type Item = Result<R, RegroupError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.has_next() {
            Some(self.next_record())
        } else {
            None
        }
    }
}

/// Writes an archive file. Nothing touches the disk until the first record is
/// added; records go to a `.part` sibling which is renamed into place by
/// `finish`. An unfinished writer removes its partial file when dropped.
pub struct WritingArchive<R> {
    path: PathBuf,
    part_path: PathBuf,
    writer: Option<BufWriter<File>>,
    count: usize,
    _record: PhantomData<fn(&R)>,
}

impl<R: Record> WritingArchive<R> {
    pub fn create(path: impl AsRef<Path>) -> Result<Self, RegroupError> {
        let path = path.as_ref();
        let file_name = path
            .file_name()
            .ok_or_else(|| RegroupError::InvalidPath(path.display().to_string()))?;
        let mut part_name = file_name.to_os_string();
        part_name.push(".part");

        Ok(Self {
            path: path.to_path_buf(),
            part_path: path.with_file_name(part_name),
            writer: None,
            count: 0,
            _record: PhantomData,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn count(&self) -> usize {
        self.count
    }

    fn open_writer(&mut self) -> Result<&mut BufWriter<File>, RegroupError> {
        if self.writer.is_none() {
            if let Some(parent) = self.part_path.parent() {
                fs::create_dir_all(parent)?;
            }
            let mut writer = BufWriter::new(File::create(&self.part_path)?);
            writer.write_all(MAGIC)?;
            self.writer = Some(writer);
        }
        self.writer
            .as_mut()
            .ok_or_else(|| RegroupError::Other("archive writer unavailable".to_string()))
    }
}

impl<R: Record> RecordSink<R> for WritingArchive<R> {
    fn add(&mut self, record: &R) -> Result<(), RegroupError> {
        let encoded = bincode::encode_to_vec(record, bincode::config::standard())?;
        let len = u32::try_from(encoded.len()).map_err(|_| {
            RegroupError::Other(format!("record of {} bytes is too large", encoded.len()))
        })?;

        let writer = self.open_writer()?;
        writer.write_all(&len.to_le_bytes())?;
        writer.write_all(&encoded)?;
        self.count += 1;
        Ok(())
    }

    fn finish(mut self) -> Result<usize, RegroupError> {
        match self.writer.take() {
            Some(mut writer) => {
                writer.flush()?;
                drop(writer);
                fs::rename(&self.part_path, &self.path)?;
            }
            // an empty result replaces whatever an earlier run left at `path`
            None => match fs::remove_file(&self.path) {
                Err(e) if e.kind() != std::io::ErrorKind::NotFound => return Err(e.into()),
                _ => {}
            },
        }
        Ok(self.count)
    }
}

impl<R> Drop for WritingArchive<R> {
    fn drop(&mut self) {
        if let Some(writer) = self.writer.take() {
            drop(writer);
            let _ = fs::remove_file(&self.part_path);
        }
    }
}

/// Reads every record of the archive at `path`.
pub fn read_all<R: Record>(path: impl AsRef<Path>) -> Result<Vec<R>, RegroupError> {
    ReadingArchive::open(path)?.get_all()
}

/// Writes `records` to a new archive at `path`, returning the record count.
pub fn write_all<'a, R: Record>(
    path: impl AsRef<Path>,
    records: impl IntoIterator<Item = &'a R>,
) -> Result<usize, RegroupError> {
    let mut archive = WritingArchive::create(path)?;
    for record in records {
        archive.add(record)?;
    }
    archive.finish()
}
