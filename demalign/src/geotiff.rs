//! GeoTIFF reading and writing.
//!
//! Only what the alignment pipeline needs is supported: the first band of a
//! strip- or tile-organised TIFF, georeferenced by either a
//! ModelTransformation matrix or a ModelTiepoint + ModelPixelScale pair,
//! with its CRS in the GeoKey directory and an optional GDAL nodata tag.
//! Written files are single-band, uncompressed, north-up or rotated.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Seek, Write};
use std::path::Path;

use thiserror::Error;
use tiff::decoder::{Decoder, DecodingResult, Limits};
use tiff::encoder::colortype::{
    ColorType, Gray16, Gray32, Gray32Float, Gray64Float, Gray8, GrayI16, GrayI32, GrayI8,
};
use tiff::encoder::{DirectoryEncoder, TiffEncoder, TiffKind, TiffValue};
use tiff::tags::Tag;

use crate::crs::Crs;
use crate::geo::GeoTransform;
use crate::raster::{DataType, RasterProfile, GTIFF_DRIVER};

// GeoKey IDs
const GT_MODEL_TYPE_GEO_KEY: u16 = 1024;
const GT_RASTER_TYPE_GEO_KEY: u16 = 1025;
const GT_CITATION_GEO_KEY: u16 = 1026;
const GEOGRAPHIC_TYPE_GEO_KEY: u16 = 2048;
const GEOG_CITATION_GEO_KEY: u16 = 2049;
const PROJECTED_CS_TYPE_GEO_KEY: u16 = 3072;
const PCS_CITATION_GEO_KEY: u16 = 3073;

// GeoKey values
const MODEL_TYPE_PROJECTED: u16 = 1;
const MODEL_TYPE_GEOGRAPHIC: u16 = 2;
const RASTER_PIXEL_IS_AREA: u16 = 1;
const RASTER_PIXEL_IS_POINT: u16 = 2;
const USER_DEFINED: u16 = 32767;

/// Errors from reading or writing GeoTIFF files.
#[derive(Error, Debug)]
pub enum GeoTiffError {
    /// I/O error opening, reading or writing the file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The TIFF structure could not be decoded or encoded.
    #[error("TIFF error: {0}")]
    Tiff(#[from] tiff::TiffError),

    /// The file has no affine georeferencing.
    #[error("TIFF has no georeferencing (ModelTransformation or ModelTiepoint/ModelPixelScale)")]
    NotGeoreferenced,

    /// Pixel type this crate does not handle.
    #[error("unsupported pixel data type: {0}")]
    UnsupportedDataType(String),

    /// Raster data inconsistent with its declared shape.
    #[error("invalid raster data: {0}")]
    InvalidData(String),
}

/// Georeferencing of a GeoTIFF, read without decoding any pixels.
#[derive(Debug, Clone, PartialEq)]
pub struct GridInfo {
    /// Number of columns.
    pub width: usize,
    /// Number of rows.
    pub height: usize,
    /// Pixel-to-world transform.
    pub transform: GeoTransform,
    /// CRS from the GeoKey directory.
    pub crs: Option<Crs>,
}

fn open_decoder(path: &Path) -> Result<Decoder<BufReader<File>>, GeoTiffError> {
    let file = File::open(path)?;
    let decoder = Decoder::new(BufReader::new(file))?;

    // Elevation rasters easily exceed the default decoding limits
    let mut limits = Limits::default();
    limits.decoding_buffer_size = 1024 * 1024 * 1024; // 1 GB
    limits.intermediate_buffer_size = 1024 * 1024 * 1024; // 1 GB
    limits.ifd_value_size = 1024 * 1024 * 1024;
    Ok(decoder.with_limits(limits))
}

/// Read the grid geometry of a GeoTIFF.
pub fn read_grid<P: AsRef<Path>>(path: P) -> Result<GridInfo, GeoTiffError> {
    let mut decoder = open_decoder(path.as_ref())?;
    let (width, height) = decoder.dimensions()?;
    let (transform, crs) = read_georeferencing(&mut decoder)?;

    Ok(GridInfo {
        width: width as usize,
        height: height as usize,
        transform,
        crs,
    })
}

/// Read band 1 of a GeoTIFF together with its profile.
///
/// Samples are returned row-major as `f64`; the original type is recorded
/// in the profile's `dtype`.
pub fn read<P: AsRef<Path>>(path: P) -> Result<(RasterProfile, Vec<f64>), GeoTiffError> {
    let mut decoder = open_decoder(path.as_ref())?;
    let (width, height) = decoder.dimensions()?;
    let (width, height) = (width as usize, height as usize);
    let (transform, crs) = read_georeferencing(&mut decoder)?;
    let nodata = read_nodata(&mut decoder);

    let (dtype, samples) = decode_samples(decoder.read_image()?)?;
    let pixels = width * height;
    if pixels == 0 || samples.len() % pixels != 0 {
        return Err(GeoTiffError::InvalidData(format!(
            "{} samples do not fit a {}x{} image",
            samples.len(),
            width,
            height
        )));
    }

    // Chunky multi-sample images interleave bands; keep band 1
    let samples_per_pixel = samples.len() / pixels;
    let count = samples_per_pixel as u16;
    let data = if samples_per_pixel == 1 {
        samples
    } else {
        samples.into_iter().step_by(samples_per_pixel).collect()
    };

    let profile = RasterProfile {
        driver: GTIFF_DRIVER.to_string(),
        width,
        height,
        count,
        dtype,
        crs,
        transform,
        nodata,
    };

    Ok((profile, data))
}

fn decode_samples(result: DecodingResult) -> Result<(DataType, Vec<f64>), GeoTiffError> {
    let decoded = match result {
        DecodingResult::U8(d) => (DataType::UInt8, d.into_iter().map(f64::from).collect()),
        DecodingResult::I8(d) => (DataType::Int8, d.into_iter().map(f64::from).collect()),
        DecodingResult::U16(d) => (DataType::UInt16, d.into_iter().map(f64::from).collect()),
        DecodingResult::I16(d) => (DataType::Int16, d.into_iter().map(f64::from).collect()),
        DecodingResult::U32(d) => (DataType::UInt32, d.into_iter().map(f64::from).collect()),
        DecodingResult::I32(d) => (DataType::Int32, d.into_iter().map(f64::from).collect()),
        DecodingResult::F32(d) => (DataType::Float32, d.into_iter().map(f64::from).collect()),
        DecodingResult::F64(d) => (DataType::Float64, d),
        DecodingResult::U64(_) => return Err(GeoTiffError::UnsupportedDataType("uint64".into())),
        DecodingResult::I64(_) => return Err(GeoTiffError::UnsupportedDataType("int64".into())),
    };
    Ok(decoded)
}

fn read_georeferencing<R: Read + Seek>(
    decoder: &mut Decoder<R>,
) -> Result<(GeoTransform, Option<Crs>), GeoTiffError> {
    let geokeys = decoder.get_tag_u16_vec(Tag::GeoKeyDirectoryTag).ok();
    let ascii = decoder.get_tag_ascii_string(Tag::GeoAsciiParamsTag).ok();
    let keys = geokeys
        .as_deref()
        .map(|k| GeoKeys::parse(k, ascii.as_deref()))
        .unwrap_or_default();

    let mut transform = read_transform(decoder)?;
    if keys.raster_type == Some(RASTER_PIXEL_IS_POINT) {
        // Tie point refers to the pixel centre; shift to the corner
        let (x, y) = transform.apply(-0.5, -0.5);
        transform.c = x;
        transform.f = y;
    }

    Ok((transform, keys.crs()))
}

fn read_transform<R: Read + Seek>(decoder: &mut Decoder<R>) -> Result<GeoTransform, GeoTiffError> {
    if let Ok(m) = decoder.get_tag_f64_vec(Tag::ModelTransformationTag) {
        if m.len() >= 8 {
            return Ok(GeoTransform::new(m[0], m[1], m[3], m[4], m[5], m[7]));
        }
    }

    let tiepoint = decoder.get_tag_f64_vec(Tag::ModelTiepointTag);
    let scale = decoder.get_tag_f64_vec(Tag::ModelPixelScaleTag);
    if let (Ok(tiepoint), Ok(scale)) = (tiepoint, scale) {
        if tiepoint.len() >= 6 && scale.len() >= 2 {
            // Tiepoint: [i, j, k, x, y, z] ties raster (i, j) to world (x, y)
            let (i, j, x, y) = (tiepoint[0], tiepoint[1], tiepoint[3], tiepoint[4]);
            let (sx, sy) = (scale[0], scale[1]);
            return Ok(GeoTransform::new(sx, 0.0, x - i * sx, 0.0, -sy, y + j * sy));
        }
    }

    Err(GeoTiffError::NotGeoreferenced)
}

fn read_nodata<R: Read + Seek>(decoder: &mut Decoder<R>) -> Option<f64> {
    decoder
        .get_tag_ascii_string(Tag::GdalNodata)
        .ok()
        .and_then(|s| s.trim_matches(|c: char| c == '\0' || c.is_whitespace()).parse().ok())
}

/// The GeoKey entries this crate cares about.
#[derive(Debug, Default, PartialEq)]
struct GeoKeys {
    model_type: Option<u16>,
    raster_type: Option<u16>,
    geographic_type: Option<u16>,
    projected_type: Option<u16>,
    citation: Option<String>,
}

impl GeoKeys {
    /// Parse a GeoKeyDirectory: a 4-value header followed by
    /// `[key_id, tag_location, count, value_or_offset]` entries.
    fn parse(directory: &[u16], ascii: Option<&str>) -> Self {
        let mut keys = GeoKeys::default();
        if directory.len() < 4 {
            return keys;
        }

        let ascii_location = Tag::GeoAsciiParamsTag.to_u16();
        let count = directory[3] as usize;
        for entry in directory[4..].chunks_exact(4).take(count) {
            let (id, location, len, value) = (entry[0], entry[1], entry[2], entry[3]);
            let inline = if location == 0 { Some(value) } else { None };
            match id {
                GT_MODEL_TYPE_GEO_KEY => keys.model_type = inline,
                GT_RASTER_TYPE_GEO_KEY => keys.raster_type = inline,
                GEOGRAPHIC_TYPE_GEO_KEY => keys.geographic_type = inline,
                PROJECTED_CS_TYPE_GEO_KEY => keys.projected_type = inline,
                GT_CITATION_GEO_KEY | GEOG_CITATION_GEO_KEY | PCS_CITATION_GEO_KEY
                    if location == ascii_location =>
                {
                    let start = value as usize;
                    let end = start + len as usize;
                    if let Some(text) = ascii.and_then(|a| a.get(start..end)) {
                        let text = text.trim_end_matches(['|', '\0']).trim();
                        if text.contains("+proj=") {
                            keys.citation = Some(text.to_string());
                        }
                    }
                }
                _ => {}
            }
        }
        keys
    }

    fn crs(&self) -> Option<Crs> {
        let code = |c: Option<u16>| c.filter(|&c| c != 0 && c != USER_DEFINED);
        if let Some(code) = code(self.projected_type) {
            return Some(Crs::Epsg(code));
        }
        if let Some(code) = code(self.geographic_type) {
            return Some(Crs::Epsg(code));
        }
        self.citation.clone().map(Crs::Proj)
    }
}

/// GeoKey directory and GeoAsciiParams for a CRS.
fn build_geokeys(crs: Option<&Crs>) -> (Vec<u16>, Option<String>) {
    let mut entries: Vec<[u16; 4]> = Vec::new();
    let mut ascii = None;
    let ascii_location = Tag::GeoAsciiParamsTag.to_u16();

    match crs {
        Some(crs @ Crs::Epsg(code)) => {
            if crs.is_geographic() {
                entries.push([GT_MODEL_TYPE_GEO_KEY, 0, 1, MODEL_TYPE_GEOGRAPHIC]);
                entries.push([GT_RASTER_TYPE_GEO_KEY, 0, 1, RASTER_PIXEL_IS_AREA]);
                entries.push([GEOGRAPHIC_TYPE_GEO_KEY, 0, 1, *code]);
            } else {
                entries.push([GT_MODEL_TYPE_GEO_KEY, 0, 1, MODEL_TYPE_PROJECTED]);
                entries.push([GT_RASTER_TYPE_GEO_KEY, 0, 1, RASTER_PIXEL_IS_AREA]);
                entries.push([PROJECTED_CS_TYPE_GEO_KEY, 0, 1, *code]);
            }
        }
        Some(crs @ Crs::Proj(definition)) => {
            // Citation points into GeoAsciiParams; the trailing '|' is counted
            let params = format!("{}|", definition);
            let len = params.len() as u16;
            if crs.is_geographic() {
                entries.push([GT_MODEL_TYPE_GEO_KEY, 0, 1, MODEL_TYPE_GEOGRAPHIC]);
                entries.push([GT_RASTER_TYPE_GEO_KEY, 0, 1, RASTER_PIXEL_IS_AREA]);
                entries.push([GEOGRAPHIC_TYPE_GEO_KEY, 0, 1, USER_DEFINED]);
                entries.push([GEOG_CITATION_GEO_KEY, ascii_location, len, 0]);
            } else {
                entries.push([GT_MODEL_TYPE_GEO_KEY, 0, 1, MODEL_TYPE_PROJECTED]);
                entries.push([GT_RASTER_TYPE_GEO_KEY, 0, 1, RASTER_PIXEL_IS_AREA]);
                entries.push([PROJECTED_CS_TYPE_GEO_KEY, 0, 1, USER_DEFINED]);
                entries.push([PCS_CITATION_GEO_KEY, ascii_location, len, 0]);
            }
            ascii = Some(params);
        }
        None => {
            entries.push([GT_RASTER_TYPE_GEO_KEY, 0, 1, RASTER_PIXEL_IS_AREA]);
        }
    }

    let mut directory = vec![1, 1, 0, entries.len() as u16];
    directory.extend(entries.iter().flatten());
    (directory, ascii)
}

fn write_geo_tags<W: Write + Seek, K: TiffKind>(
    dir: &mut DirectoryEncoder<'_, W, K>,
    profile: &RasterProfile,
) -> Result<(), GeoTiffError> {
    let t = &profile.transform;
    if t.is_north_up() && t.e < 0.0 {
        let scale = [t.a, -t.e, 0.0];
        dir.write_tag(Tag::ModelPixelScaleTag, &scale[..])?;
        let tiepoint = [0.0, 0.0, 0.0, t.c, t.f, 0.0];
        dir.write_tag(Tag::ModelTiepointTag, &tiepoint[..])?;
    } else {
        #[rustfmt::skip]
        let matrix = [
            t.a, t.b, 0.0, t.c,
            t.d, t.e, 0.0, t.f,
            0.0, 0.0, 0.0, 0.0,
            0.0, 0.0, 0.0, 1.0,
        ];
        dir.write_tag(Tag::ModelTransformationTag, &matrix[..])?;
    }

    let (geokeys, ascii) = build_geokeys(profile.crs.as_ref());
    dir.write_tag(Tag::GeoKeyDirectoryTag, &geokeys[..])?;
    if let Some(ascii) = ascii {
        dir.write_tag(Tag::GeoAsciiParamsTag, ascii.as_str())?;
    }

    if let Some(nodata) = profile.nodata {
        let text = if nodata.is_nan() {
            "nan".to_string()
        } else {
            nodata.to_string()
        };
        dir.write_tag(Tag::GdalNodata, text.as_str())?;
    }

    Ok(())
}

fn write_band<W, C>(
    encoder: &mut TiffEncoder<W>,
    profile: &RasterProfile,
    samples: &[C::Inner],
) -> Result<(), GeoTiffError>
where
    W: Write + Seek,
    C: ColorType,
    [C::Inner]: TiffValue,
{
    let mut image = encoder.new_image::<C>(profile.width as u32, profile.height as u32)?;
    write_geo_tags(image.encoder(), profile)?;
    image.write_data(samples)?;
    Ok(())
}

fn convert<T>(profile: &RasterProfile, data: &[f64], cast: impl Fn(f64) -> T) -> Vec<T> {
    data.iter().map(|&v| cast(profile.dtype.coerce(v))).collect()
}

/// Write a single-band GeoTIFF with the given profile.
///
/// Values are coerced to `profile.dtype` (integer types are rounded and
/// clamped). `data` must hold exactly `width × height` samples.
pub fn write<P: AsRef<Path>>(
    path: P,
    profile: &RasterProfile,
    data: &[f64],
) -> Result<(), GeoTiffError> {
    if profile.width == 0 || profile.height == 0 {
        return Err(GeoTiffError::InvalidData(
            "raster has zero dimensions".to_string(),
        ));
    }
    if data.len() != profile.len() {
        return Err(GeoTiffError::InvalidData(format!(
            "expected {} samples for a {}x{} raster, got {}",
            profile.len(),
            profile.width,
            profile.height,
            data.len()
        )));
    }

    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    {
        let mut encoder = TiffEncoder::new(&mut writer)?;
        match profile.dtype {
            DataType::UInt8 => {
                write_band::<_, Gray8>(&mut encoder, profile, &convert(profile, data, |v| v as u8))?
            }
            DataType::Int8 => {
                write_band::<_, GrayI8>(&mut encoder, profile, &convert(profile, data, |v| v as i8))?
            }
            DataType::UInt16 => write_band::<_, Gray16>(
                &mut encoder,
                profile,
                &convert(profile, data, |v| v as u16),
            )?,
            DataType::Int16 => write_band::<_, GrayI16>(
                &mut encoder,
                profile,
                &convert(profile, data, |v| v as i16),
            )?,
            DataType::UInt32 => write_band::<_, Gray32>(
                &mut encoder,
                profile,
                &convert(profile, data, |v| v as u32),
            )?,
            DataType::Int32 => write_band::<_, GrayI32>(
                &mut encoder,
                profile,
                &convert(profile, data, |v| v as i32),
            )?,
            DataType::Float32 => write_band::<_, Gray32Float>(
                &mut encoder,
                profile,
                &convert(profile, data, |v| v as f32),
            )?,
            DataType::Float64 => {
                write_band::<_, Gray64Float>(&mut encoder, profile, data)?;
            }
        }
    }
    writer.flush()?;
    Ok(())
}
