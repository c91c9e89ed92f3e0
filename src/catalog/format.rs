//! Binary encoding of catalog snapshots.
//!
//! Layout, all little-endian, one streaming crc32 over the whole file:
//!
//! ```text
//! magic (u32) | format version (u32) | commit id (16 bytes) | generation suffix (string)
//! engine version (3 varints) | creation major (varint)
//! catalog version (u64) | counter (varint)
//! segment count (u32) [ | min segment version (3 varints) ]
//! per segment:
//!   name (string) | id (16 bytes) | codec name (string)
//!   min index version (marker byte + 3 varints)
//!   max doc (varint)
//!   del generation (i64) | del count (u32)
//!   field infos generation (i64) | doc values generation (i64)
//!   soft del count (u32)
//!   commit id (marker byte [+ 16 bytes])        -- format >= 2
//!   field infos files (string set)
//!   doc values update files (u32 count, then (u32 field, string set) pairs)
//! user data (string map)
//! footer magic (u32) | crc32 (u32)
//! ```
//!
//! The generation suffix in the header is compared against the generation
//! parsed from the file name, so a snapshot copied under a wrong name is
//! rejected instead of silently shadowing another generation.

use crate::catalog::catalog::{CatalogLimits, SegmentCatalog};
use crate::catalog::filenames::{base36, generation_from_file_name};
use crate::catalog::record::{ID_LENGTH, Id, SegmentRecord, random_id};
use crate::catalog::version::{self, Version};
use crate::codec::CodecRegistry;
use crate::error::{Result, XystonError};
use crate::storage::{Storage, StorageInput, StorageOutput, StructReader, StructWriter};

/// Magic constant opening every snapshot.
pub const CATALOG_MAGIC: u32 = 0x5859_5354;

/// Magic constant opening the footer.
pub const FOOTER_MAGIC: u32 = !CATALOG_MAGIC;

/// Oldest snapshot format this engine can read.
pub const FORMAT_START: u32 = 1;

/// Current snapshot format; adds per-record commit ids over format 1.
pub const FORMAT_CURRENT: u32 = 2;

/// Knobs for loading a snapshot.
#[derive(Debug, Clone, Copy)]
pub struct LoadOptions {
    /// Oldest creation major the loader accepts.
    pub min_supported_major: u32,

    /// Limits the loaded catalog enforces.
    pub limits: CatalogLimits,
}

impl Default for LoadOptions {
    fn default() -> Self {
        LoadOptions {
            min_supported_major: version::MIN_SUPPORTED_MAJOR,
            limits: CatalogLimits::default(),
        }
    }
}

/// Serialize `catalog` to `output` at its current generation.
///
/// Stamps a commit id on every record that lacks one and returns the
/// snapshot's own commit id; the caller publishes it on the catalog once
/// the commit is durable.
pub fn write_catalog<W: StorageOutput>(output: W, catalog: &mut SegmentCatalog) -> Result<Id> {
    let mut writer = StructWriter::new(output);

    let snapshot_id = random_id();
    writer.write_u32(CATALOG_MAGIC)?;
    writer.write_u32(FORMAT_CURRENT)?;
    writer.write_raw(&snapshot_id)?;
    writer.write_string(&base36(catalog.generation()))?;

    writer.write_varint(version::LATEST.major as u64)?;
    writer.write_varint(version::LATEST.minor as u64)?;
    writer.write_varint(version::LATEST.bugfix as u64)?;
    writer.write_varint(catalog.creation_major() as u64)?;

    writer.write_u64(catalog.version())?;
    writer.write_varint(catalog.counter())?;

    writer.write_u32(catalog.len() as u32)?;
    if let Some(min_version) = catalog.min_segment_version() {
        write_version(&mut writer, &min_version)?;
    }

    let tracked = catalog.creation_major() >= version::TRACK_MIN_VERSION_MAJOR;
    for record in catalog.segments_mut().iter_mut() {
        if record.commit_id.is_none() {
            record.stamp_commit_id(random_id());
        }
        write_record(&mut writer, record, tracked)?;
    }

    writer.write_string_map(catalog.user_data())?;
    writer.write_footer(FOOTER_MAGIC)?;
    writer.close()?;

    Ok(snapshot_id)
}

fn write_version<W: StorageOutput>(writer: &mut StructWriter<W>, v: &Version) -> Result<()> {
    writer.write_varint(v.major as u64)?;
    writer.write_varint(v.minor as u64)?;
    writer.write_varint(v.bugfix as u64)?;
    Ok(())
}

fn write_record<W: StorageOutput>(
    writer: &mut StructWriter<W>,
    record: &SegmentRecord,
    tracked: bool,
) -> Result<()> {
    if tracked && record.min_index_version.is_none() {
        return Err(XystonError::illegal_state(format!(
            "Cannot write segment '{}': minimum index version missing",
            record.name
        )));
    }
    let total = record.del_count() as u64 + record.soft_del_count() as u64;
    if total > record.max_doc() as u64 {
        return Err(XystonError::illegal_state(format!(
            "Cannot write segment '{}': {total} deletions exceed maxDoc {}",
            record.name,
            record.max_doc()
        )));
    }

    writer.write_string(&record.name)?;
    writer.write_raw(&record.id)?;
    writer.write_string(&record.codec_name)?;

    match &record.min_index_version {
        Some(v) => {
            writer.write_u8(1)?;
            write_version(writer, v)?;
        }
        None => writer.write_u8(0)?,
    }

    writer.write_varint(record.max_doc() as u64)?;
    writer.write_i64(record.del_generation())?;
    writer.write_u32(record.del_count())?;
    writer.write_i64(record.field_infos_generation())?;
    writer.write_i64(record.doc_values_generation())?;
    writer.write_u32(record.soft_del_count())?;

    match &record.commit_id {
        Some(id) => {
            writer.write_u8(1)?;
            writer.write_raw(id)?;
        }
        None => writer.write_u8(0)?,
    }

    writer.write_string_set(record.field_infos_files())?;

    let mut fields: Vec<u32> = record.doc_values_update_files().keys().copied().collect();
    fields.sort_unstable();
    writer.write_u32(fields.len() as u32)?;
    for field in fields {
        writer.write_u32(field)?;
        writer.write_string_set(&record.doc_values_update_files()[&field])?;
    }

    Ok(())
}

/// Load the snapshot stored in `file_name`.
///
/// Every invariant the writer enforced is re-checked here, because the
/// bytes may come from any engine version or from a damaged disk. The
/// input handle is released on every path, including malformed files.
pub fn read_catalog(
    storage: &dyn Storage,
    file_name: &str,
    registry: &CodecRegistry,
    options: &LoadOptions,
) -> Result<SegmentCatalog> {
    let generation = generation_from_file_name(file_name)?;
    let input = storage.open_input(file_name)?;
    let reader = StructReader::new(input)?;

    // The reader owns the handle; any early return drops and releases it.
    read_body(reader, generation, registry, options)
}

fn read_body(
    mut reader: StructReader<Box<dyn StorageInput>>,
    generation: u64,
    registry: &CodecRegistry,
    options: &LoadOptions,
) -> Result<SegmentCatalog> {
    let magic = reader.read_u32()?;
    if magic != CATALOG_MAGIC {
        return Err(XystonError::format(format!(
            "Bad magic {magic:#010x}, expected {CATALOG_MAGIC:#010x}; not a catalog snapshot"
        )));
    }

    let format = reader.read_u32()?;
    if !(FORMAT_START..=FORMAT_CURRENT).contains(&format) {
        return Err(XystonError::format(format!(
            "Unsupported snapshot format {format} (this engine reads {FORMAT_START}..={FORMAT_CURRENT})"
        )));
    }

    let snapshot_id: Id = read_id(&mut reader)?;

    let suffix = reader.read_string()?;
    if suffix != base36(generation) {
        return Err(XystonError::corrupt(format!(
            "Snapshot names generation '{suffix}' but the file is named for generation {generation}"
        )));
    }

    let written_by = read_version(&mut reader)?;
    let creation_major = reader.read_varint()? as u32;
    if creation_major > written_by.major {
        return Err(XystonError::corrupt(format!(
            "Creation major {creation_major} is newer than the engine {written_by} that wrote the snapshot"
        )));
    }
    if creation_major < options.min_supported_major {
        return Err(XystonError::version_too_old(format!(
            "Index was created by engine major {creation_major}; this engine reads \
             {} and newer — rewrite the index with an intermediate release",
            options.min_supported_major
        )));
    }

    let catalog_version = reader.read_u64()?;
    let counter = reader.read_varint()?;

    let segment_count = reader.read_u32()? as usize;
    let min_segment_version = if segment_count > 0 {
        Some(read_version(&mut reader)?)
    } else {
        None
    };

    let mut catalog = SegmentCatalog::raw_for_load(creation_major, options.limits);
    let mut total_docs: u64 = 0;

    for _ in 0..segment_count {
        let record = read_record(&mut reader, format, creation_major, registry)?;

        if let (Some(min_version), Some(floor)) = (record.min_index_version, min_segment_version)
            && !min_version.on_or_after(&floor)
        {
            return Err(XystonError::corrupt(format!(
                "Snapshot records minimum segment version {floor} but segment '{}' \
                 has older version {min_version}",
                record.name
            )));
        }
        if creation_major >= version::TRACK_MIN_VERSION_MAJOR
            && let Some(min_version) = record.min_index_version
            && min_version.major < creation_major
        {
            return Err(XystonError::corrupt(format!(
                "Segment '{}' has version {min_version}, older than creation major {creation_major}",
                record.name
            )));
        }

        total_docs += record.max_doc() as u64;
        catalog.push_unchecked(record);
    }

    catalog.set_user_data_raw(reader.read_string_map()?);
    reader.verify_footer(FOOTER_MAGIC)?;
    reader.close()?;

    if total_docs > options.limits.max_docs {
        return Err(XystonError::capacity(format!(
            "Snapshot holds {total_docs} documents, more than the configured ceiling of {}",
            options.limits.max_docs
        )));
    }

    catalog.set_loaded_version(catalog_version);
    catalog.set_counter(counter);
    catalog.set_generations(generation, generation);
    catalog.set_commit_id(Some(snapshot_id));

    Ok(catalog)
}

fn read_id<R: StorageInput>(reader: &mut StructReader<R>) -> Result<Id> {
    let bytes = reader.read_raw(ID_LENGTH)?;
    let id: Id = bytes
        .try_into()
        .map_err(|_| XystonError::corrupt("Truncated identifier"))?;
    Ok(id)
}

fn read_version<R: StorageInput>(reader: &mut StructReader<R>) -> Result<Version> {
    let major = read_version_component(reader)?;
    let minor = read_version_component(reader)?;
    let bugfix = read_version_component(reader)?;
    Ok(Version::new(major, minor, bugfix))
}

fn read_version_component<R: StorageInput>(reader: &mut StructReader<R>) -> Result<u32> {
    let value = reader.read_varint()?;
    u32::try_from(value)
        .map_err(|_| XystonError::corrupt(format!("Version component {value} out of range")))
}

fn read_record<R: StorageInput>(
    reader: &mut StructReader<R>,
    format: u32,
    creation_major: u32,
    registry: &CodecRegistry,
) -> Result<SegmentRecord> {
    let name = reader.read_string()?;
    let id = read_id(reader)?;
    let codec_name = reader.read_string()?;
    registry.resolve(&codec_name)?;

    let min_index_version = match reader.read_u8()? {
        0 => None,
        1 => Some(read_version(reader)?),
        marker => {
            return Err(XystonError::corrupt(format!(
                "Invalid version marker {marker} in segment '{name}'"
            )));
        }
    };
    if creation_major >= version::TRACK_MIN_VERSION_MAJOR && min_index_version.is_none() {
        return Err(XystonError::corrupt(format!(
            "Segment '{name}' lacks its minimum index version in an index created \
             by engine {creation_major}"
        )));
    }

    let max_doc = reader.read_varint()?;
    let max_doc = u32::try_from(max_doc)
        .map_err(|_| XystonError::corrupt(format!("maxDoc {max_doc} out of range")))?;

    let del_generation = reader.read_i64()?;
    if del_generation < -1 {
        return Err(XystonError::corrupt(format!(
            "Invalid delGeneration {del_generation} in segment '{name}'"
        )));
    }
    let del_count = reader.read_u32()?;
    if del_count > max_doc {
        return Err(XystonError::corrupt(format!(
            "Invalid delCount {del_count} vs maxDoc {max_doc} in segment '{name}'"
        )));
    }
    let field_infos_generation = reader.read_i64()?;
    if field_infos_generation < -1 {
        return Err(XystonError::corrupt(format!(
            "Invalid fieldInfosGeneration {field_infos_generation} in segment '{name}'"
        )));
    }
    let doc_values_generation = reader.read_i64()?;
    if doc_values_generation < -1 {
        return Err(XystonError::corrupt(format!(
            "Invalid docValuesGeneration {doc_values_generation} in segment '{name}'"
        )));
    }
    let soft_del_count = reader.read_u32()?;
    if soft_del_count > max_doc || del_count as u64 + soft_del_count as u64 > max_doc as u64 {
        return Err(XystonError::corrupt(format!(
            "Invalid deletion counts {del_count}+{soft_del_count} vs maxDoc {max_doc} \
             in segment '{name}'"
        )));
    }

    let commit_id = if format >= 2 {
        match reader.read_u8()? {
            0 => None,
            1 => Some(read_id(reader)?),
            marker => {
                return Err(XystonError::corrupt(format!(
                    "Invalid commit id marker {marker} in segment '{name}'"
                )));
            }
        }
    } else {
        None
    };

    let field_infos_files = reader.read_string_set()?;

    let field_count = reader.read_u32()? as usize;
    let mut doc_values_update_files = std::collections::HashMap::with_capacity(field_count);
    for _ in 0..field_count {
        let field = reader.read_u32()?;
        doc_values_update_files.insert(field, reader.read_string_set()?);
    }

    let mut record = SegmentRecord::new(name, id, codec_name, max_doc, min_index_version);
    record.set_del_generation(del_generation)?;
    record.set_del_count(del_count)?;
    record.set_field_infos_generation(field_infos_generation)?;
    record.set_doc_values_generation(doc_values_generation)?;
    record.set_soft_del_count(soft_del_count)?;
    if let Some(commit_id) = commit_id {
        record.stamp_commit_id(commit_id);
    }
    record.set_field_infos_files(field_infos_files);
    record.set_doc_values_update_files(doc_values_update_files);

    Ok(record)
}
