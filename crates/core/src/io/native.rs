//! Native GeoTIFF reading/writing
//!
//! Uses the `tiff` crate for single-band TIFF I/O plus the GeoTIFF
//! georeferencing tags (ModelPixelScaleTag/ModelTiepointTag). Enough for
//! elevation surfaces in and visibility grids out.

use crate::error::{Error, Result};
use crate::raster::{GeoTransform, Raster, RasterElement};
use std::fs::File;
use std::path::Path;
use tiff::decoder::{Decoder, DecodingResult};
use tiff::encoder::colortype::Gray32Float;
use tiff::encoder::TiffEncoder;
use tiff::tags::Tag;

/// Options for writing GeoTIFF files
#[derive(Debug, Clone, Default)]
pub struct GeoTiffOptions {
    /// Reserved; native mode always writes uncompressed Gray32Float.
    pub compression: Option<String>,
}

/// Read a GeoTIFF file into a Raster.
///
/// Reads the first image of the file; all common integer and float pixel
/// formats are cast into `T`, unrepresentable values become `T`'s default
/// nodata.
pub fn read_geotiff<T, P>(path: P) -> Result<Raster<T>>
where
    T: RasterElement,
    P: AsRef<Path>,
{
    let file = File::open(path.as_ref())?;

    let mut decoder =
        Decoder::new(file).map_err(|e| Error::Other(format!("TIFF decode error: {}", e)))?;

    let (width, height) = decoder
        .dimensions()
        .map_err(|e| Error::Other(format!("Cannot read dimensions: {}", e)))?;

    let rows = height as usize;
    let cols = width as usize;

    let result = decoder
        .read_image()
        .map_err(|e| Error::Other(format!("Cannot read image data: {}", e)))?;

    let data: Vec<T> = match result {
        DecodingResult::F32(buf) => cast_buffer(&buf),
        DecodingResult::F64(buf) => cast_buffer(&buf),
        DecodingResult::U8(buf) => cast_buffer(&buf),
        DecodingResult::U16(buf) => cast_buffer(&buf),
        DecodingResult::U32(buf) => cast_buffer(&buf),
        DecodingResult::I8(buf) => cast_buffer(&buf),
        DecodingResult::I16(buf) => cast_buffer(&buf),
        DecodingResult::I32(buf) => cast_buffer(&buf),
        _ => {
            return Err(Error::UnsupportedDataType(
                "Unsupported TIFF pixel format".to_string(),
            ))
        }
    };

    if data.len() != rows * cols {
        return Err(Error::InvalidDimensions {
            width: cols,
            height: rows,
        });
    }

    let mut raster = Raster::from_vec(data, rows, cols)?;

    // Georeferencing tags are optional; a bare TIFF keeps the default transform
    if let Ok(transform) = read_geotransform(&mut decoder) {
        raster.set_transform(transform);
    }

    Ok(raster)
}

fn cast_buffer<S, T>(buf: &[S]) -> Vec<T>
where
    S: Copy + num_traits::NumCast,
    T: RasterElement,
{
    buf.iter()
        .map(|&v| num_traits::cast(v).unwrap_or(T::default_nodata()))
        .collect()
}

/// Attempt to read a GeoTransform from TIFF tags
fn read_geotransform<R: std::io::Read + std::io::Seek>(
    decoder: &mut Decoder<R>,
) -> Result<GeoTransform> {
    // ModelPixelScaleTag = 33550, ModelTiepointTag = 33922
    let scale_tag = Tag::Unknown(33550);
    let tiepoint_tag = Tag::Unknown(33922);

    let scale = decoder
        .get_tag_f64_vec(scale_tag)
        .map_err(|_| Error::Other("No pixel scale tag".into()))?;

    let tiepoint = decoder
        .get_tag_f64_vec(tiepoint_tag)
        .map_err(|_| Error::Other("No tiepoint tag".into()))?;

    if scale.len() >= 2 && tiepoint.len() >= 6 {
        // tiepoint: [I, J, K, X, Y, Z]; scale: [ScaleX, ScaleY, ScaleZ]
        let origin_x = tiepoint[3] - tiepoint[0] * scale[0];
        let origin_y = tiepoint[4] + tiepoint[1] * scale[1];
        let pixel_width = scale[0];
        let pixel_height = -scale[1]; // Negative for north-up

        return Ok(GeoTransform::new(
            origin_x,
            origin_y,
            pixel_width,
            pixel_height,
        ));
    }

    Err(Error::Other("Cannot determine geotransform".into()))
}

/// Write a Raster to a GeoTIFF file.
///
/// Writes 32-bit float with ModelPixelScale/ModelTiepoint tags and a minimal
/// projected-CRS GeoKey directory.
pub fn write_geotiff<T, P>(raster: &Raster<T>, path: P, _options: Option<GeoTiffOptions>) -> Result<()>
where
    T: RasterElement,
    P: AsRef<Path>,
{
    let file = File::create(path.as_ref())?;

    let mut encoder =
        TiffEncoder::new(file).map_err(|e| Error::Other(format!("TIFF encoder error: {}", e)))?;

    let (rows, cols) = raster.shape();

    let data: Vec<f32> = raster
        .data()
        .iter()
        .map(|&v| num_traits::cast(v).unwrap_or(f32::NAN))
        .collect();

    let mut image = encoder
        .new_image::<Gray32Float>(cols as u32, rows as u32)
        .map_err(|e| Error::Other(format!("Cannot create TIFF image: {}", e)))?;

    let gt = raster.transform();

    // ModelPixelScaleTag
    let scale = vec![gt.pixel_width, gt.pixel_height.abs(), 0.0];
    image
        .encoder()
        .write_tag(Tag::Unknown(33550), scale.as_slice())
        .map_err(|e| Error::Other(format!("Cannot write scale tag: {}", e)))?;

    // ModelTiepointTag
    let tiepoint = vec![0.0, 0.0, 0.0, gt.origin_x, gt.origin_y, 0.0];
    image
        .encoder()
        .write_tag(Tag::Unknown(33922), tiepoint.as_slice())
        .map_err(|e| Error::Other(format!("Cannot write tiepoint tag: {}", e)))?;

    // GeoKeyDirectoryTag: GTModelTypeGeoKey=Projected, GTRasterTypeGeoKey=PixelIsArea
    let geokeys: Vec<u16> = vec![
        1, 1, 0, 2, //
        1024, 0, 1, 1, //
        1025, 0, 1, 1, //
    ];
    image
        .encoder()
        .write_tag(Tag::Unknown(34735), geokeys.as_slice())
        .map_err(|e| Error::Other(format!("Cannot write geokey tag: {}", e)))?;

    image
        .write_data(&data)
        .map_err(|e| Error::Other(format!("Cannot write image data: {}", e)))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_geotiff_roundtrip() {
        let mut raster: Raster<f64> = Raster::new(8, 12);
        for r in 0..8 {
            for c in 0..12 {
                raster.set(r, c, (r * 12 + c) as f64).unwrap();
            }
        }
        raster.set_transform(GeoTransform::new(500_000.0, 8_200_000.0, 30.0, -30.0));

        let tmp = tempfile::NamedTempFile::with_suffix(".tif").unwrap();
        write_geotiff(&raster, tmp.path(), None).unwrap();

        let reloaded: Raster<f64> = read_geotiff(tmp.path()).unwrap();
        assert_eq!(reloaded.shape(), (8, 12));
        assert_eq!(reloaded.get(3, 7).unwrap(), 43.0);

        let gt = reloaded.transform();
        assert!((gt.origin_x - 500_000.0).abs() < 1e-6);
        assert!((gt.pixel_width - 30.0).abs() < 1e-10);
        assert!((gt.pixel_height + 30.0).abs() < 1e-10);
    }
}
