//! Bitcode payloads stored in the example-store tables.
//!
//! Every payload is `[record version][BITCODE_PREFIX][bitcode bytes]`.

use ndarray::{Array2, ArrayView1, ArrayView3};

use crate::constants::store::{BITCODE_PREFIX, EXAMPLE_RECORD_VERSION, SCHEMA_RECORD_VERSION};
use crate::data::{
    Channel, ChannelSpec, ClassScheme, ExampleSchema, NormalizationType, ValidityMask,
};
use crate::errors::ExampleError;

#[derive(Clone, Debug, bitcode::Encode, bitcode::Decode)]
struct SchemaRecord {
    channel_fields: Vec<String>,
    channel_levels: Vec<i32>,
    dilation_distance_metres: f64,
    mask_rows: u32,
    mask_columns: u32,
    mask_cells: Vec<u8>,
    normalization: u8,
    half_rows: u32,
    half_columns: u32,
    num_classes: u8,
}

/// Tensors of one stored example.
#[derive(Clone, Debug, PartialEq, bitcode::Encode, bitcode::Decode)]
pub(crate) struct ExampleRecord {
    /// Row-major window values, rows x columns x channels.
    pub predictors: Vec<f32>,
    pub target: Vec<u8>,
    pub norm_first: Vec<f32>,
    pub norm_second: Vec<f32>,
}

impl ExampleRecord {
    pub(crate) fn from_views(
        predictors: ArrayView3<'_, f32>,
        target: ArrayView1<'_, u8>,
        norm_first: ArrayView1<'_, f32>,
        norm_second: ArrayView1<'_, f32>,
    ) -> Self {
        Self {
            predictors: predictors.iter().copied().collect(),
            target: target.to_vec(),
            norm_first: norm_first.to_vec(),
            norm_second: norm_second.to_vec(),
        }
    }
}

fn normalization_tag(kind: NormalizationType) -> u8 {
    match kind {
        NormalizationType::MinMax => 0,
        NormalizationType::ZScore => 1,
    }
}

fn to_u32(value: usize, what: &str) -> Result<u32, ExampleError> {
    u32::try_from(value).map_err(|_| ExampleError::Store(format!("{what} {value} is too large")))
}

pub(crate) fn encode_schema(schema: &ExampleSchema) -> Result<Vec<u8>, ExampleError> {
    let (mask_rows, mask_columns) = schema.mask.shape();
    let record = SchemaRecord {
        channel_fields: schema.channels.iter().map(|c| c.field.clone()).collect(),
        channel_levels: schema.channels.iter().map(|c| c.pressure_mb).collect(),
        dilation_distance_metres: schema.dilation_distance_metres,
        mask_rows: to_u32(mask_rows, "mask rows")?,
        mask_columns: to_u32(mask_columns, "mask columns")?,
        mask_cells: schema.mask.cells().iter().map(|cell| u8::from(*cell)).collect(),
        normalization: normalization_tag(schema.normalization),
        half_rows: to_u32(schema.half_rows, "half rows")?,
        half_columns: to_u32(schema.half_columns, "half columns")?,
        num_classes: schema.scheme.num_classes() as u8,
    };
    Ok(tag_payload(SCHEMA_RECORD_VERSION, &bitcode::encode(&record)))
}

pub(crate) fn decode_schema(bytes: &[u8]) -> Result<ExampleSchema, ExampleError> {
    let raw = untag_payload(SCHEMA_RECORD_VERSION, bytes, "schema")?;
    let record: SchemaRecord = bitcode::decode(raw)
        .map_err(|err| ExampleError::Store(format!("corrupt schema record: {err}")))?;
    if record.channel_fields.len() != record.channel_levels.len() {
        return Err(ExampleError::Store(
            "schema record has mismatched channel arrays".into(),
        ));
    }
    let channels = ChannelSpec::new(
        record
            .channel_fields
            .into_iter()
            .zip(record.channel_levels)
            .map(|(field, level)| Channel::new(field, level))
            .collect(),
    )?;
    let cells = Array2::from_shape_vec(
        (record.mask_rows as usize, record.mask_columns as usize),
        record.mask_cells.into_iter().map(|cell| cell != 0).collect(),
    )
    .map_err(|err| ExampleError::Store(format!("corrupt validity mask: {err}")))?;
    let normalization = match record.normalization {
        0 => NormalizationType::MinMax,
        1 => NormalizationType::ZScore,
        other => {
            return Err(ExampleError::Store(format!(
                "unknown normalization tag {other}"
            )));
        }
    };
    Ok(ExampleSchema {
        channels,
        dilation_distance_metres: record.dilation_distance_metres,
        mask: ValidityMask::new(cells),
        normalization,
        half_rows: record.half_rows as usize,
        half_columns: record.half_columns as usize,
        scheme: ClassScheme::from_num_classes(usize::from(record.num_classes))?,
    })
}

pub(crate) fn encode_example(record: &ExampleRecord) -> Vec<u8> {
    tag_payload(EXAMPLE_RECORD_VERSION, &bitcode::encode(record))
}

pub(crate) fn decode_example(bytes: &[u8]) -> Result<ExampleRecord, ExampleError> {
    let raw = untag_payload(EXAMPLE_RECORD_VERSION, bytes, "example")?;
    bitcode::decode(raw).map_err(|err| ExampleError::Store(format!("corrupt example record: {err}")))
}

fn tag_payload(version: u8, bytes: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(2 + bytes.len());
    out.push(version);
    out.push(BITCODE_PREFIX);
    out.extend_from_slice(bytes);
    out
}

fn untag_payload<'a>(version: u8, bytes: &'a [u8], what: &str) -> Result<&'a [u8], ExampleError> {
    match bytes {
        [found, ..] if *found != version => Err(ExampleError::Store(format!(
            "{what} record version mismatch (found {found}, expected {version})"
        ))),
        [_, BITCODE_PREFIX, rest @ ..] => Ok(rest),
        _ => Err(ExampleError::Store(format!(
            "{what} payload missing expected prefix"
        ))),
    }
}
