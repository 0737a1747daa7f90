use std::io::{BufWriter, Read, Write};
use std::path::Path;

use crate::pointcloud::PointCloud;

const MAGIC: &[u8; 6] = b"\x93NUMPY";
const MAX_HEADER_LEN: usize = 1 << 16;
const MAX_ELEMENTS: usize = 1 << 30;

/// Error types for the NPY module.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum NpyError {
    /// Failed to read or write the NPY file
    #[error("Failed to read or write NPY file")]
    Io(#[from] std::io::Error),

    /// Malformed NPY header
    #[error("Malformed NPY header: {0}")]
    MalformedHeader(String),

    /// Unsupported element type
    #[error("Unsupported NPY dtype: {0}")]
    UnsupportedDtype(String),

    /// Fortran ordered arrays are not supported
    #[error("Fortran ordered NPY arrays are not supported")]
    FortranOrder,

    /// The array does not have the expected shape
    #[error("Invalid NPY shape {actual:?}, expected {expected}")]
    InvalidShape {
        /// Shape found in the file.
        actual: Vec<usize>,
        /// Human readable expected shape.
        expected: &'static str,
    },

    /// Invalid NPY file extension
    #[error("Invalid NPY file extension. Got:{0}")]
    InvalidFileExtension(String),
}

/// A dense C-ordered array of doubles read from or written to a `.npy` file.
#[derive(Debug, Clone, PartialEq)]
pub struct NpyArray {
    /// The array dimensions.
    pub shape: Vec<usize>,
    /// Elements in row-major order.
    pub data: Vec<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Dtype {
    F32,
    F64,
}

#[derive(Debug)]
struct NpyHeader {
    dtype: Dtype,
    shape: Vec<usize>,
}

fn check_extension(path: &Path) -> Result<(), NpyError> {
    let Some(file_ext) = path.extension() else {
        return Err(NpyError::InvalidFileExtension("".into()));
    };
    if file_ext != "npy" {
        return Err(NpyError::InvalidFileExtension(
            file_ext.to_string_lossy().to_string(),
        ));
    }
    Ok(())
}

/// Extract the raw value of `'key': value` from the header dictionary.
fn dict_value<'a>(dict: &'a str, key: &str) -> Result<&'a str, NpyError> {
    let pattern = format!("'{key}':");
    let start = dict
        .find(&pattern)
        .ok_or_else(|| NpyError::MalformedHeader(format!("missing key {key}")))?
        + pattern.len();
    let rest = dict[start..].trim_start();

    // the shape is the only tuple valued key
    let end = if rest.starts_with('(') {
        rest.find(')').map(|i| i + 1)
    } else {
        rest.find([',', '}'])
    };
    let end = end.ok_or_else(|| NpyError::MalformedHeader(format!("unterminated {key}")))?;
    Ok(rest[..end].trim())
}

fn parse_header_dict(dict: &str) -> Result<NpyHeader, NpyError> {
    let descr = dict_value(dict, "descr")?.trim_matches(|c| c == '\'' || c == '"');
    let dtype = match descr {
        "<f8" => Dtype::F64,
        "<f4" => Dtype::F32,
        other => return Err(NpyError::UnsupportedDtype(other.to_string())),
    };

    match dict_value(dict, "fortran_order")? {
        "False" => {}
        "True" => return Err(NpyError::FortranOrder),
        other => {
            return Err(NpyError::MalformedHeader(format!(
                "fortran_order is {other}"
            )))
        }
    }

    let shape = dict_value(dict, "shape")?
        .trim_start_matches('(')
        .trim_end_matches(')')
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<usize>()
                .map_err(|_| NpyError::MalformedHeader(format!("bad dimension {s}")))
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(NpyHeader { dtype, shape })
}

fn parse_header<R: Read>(reader: &mut R) -> Result<NpyHeader, NpyError> {
    let mut magic = [0u8; 6];
    reader.read_exact(&mut magic)?;
    if &magic != MAGIC {
        return Err(NpyError::MalformedHeader("bad magic string".into()));
    }

    let mut version = [0u8; 2];
    reader.read_exact(&mut version)?;
    let header_len = match version[0] {
        1 => {
            let mut len = [0u8; 2];
            reader.read_exact(&mut len)?;
            u16::from_le_bytes(len) as usize
        }
        2 | 3 => {
            let mut len = [0u8; 4];
            reader.read_exact(&mut len)?;
            u32::from_le_bytes(len) as usize
        }
        v => return Err(NpyError::MalformedHeader(format!("version {v}"))),
    };
    if header_len > MAX_HEADER_LEN {
        return Err(NpyError::MalformedHeader("header too long".into()));
    }

    let mut dict = vec![0u8; header_len];
    reader.read_exact(&mut dict)?;
    let dict = std::str::from_utf8(&dict)
        .map_err(|_| NpyError::MalformedHeader("header is not text".into()))?;

    parse_header_dict(dict)
}

/// Read a `.npy` file holding a little-endian `float32` or `float64` array.
///
/// `float32` data is widened to `f64`.
pub fn read_npy(path: impl AsRef<Path>) -> Result<NpyArray, NpyError> {
    check_extension(path.as_ref())?;

    let file = std::fs::File::open(path)?;
    let mut reader = std::io::BufReader::new(file);
    let header = parse_header(&mut reader)?;

    let num_elements = header
        .shape
        .iter()
        .try_fold(1usize, |acc, &d| acc.checked_mul(d))
        .filter(|&n| n <= MAX_ELEMENTS)
        .ok_or_else(|| NpyError::MalformedHeader("array too large".into()))?;

    let data = match header.dtype {
        Dtype::F64 => {
            let mut bytes = vec![0u8; num_elements * 8];
            reader.read_exact(&mut bytes)?;
            bytes
                .chunks_exact(8)
                .map(|c| f64::from_le_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]]))
                .collect()
        }
        Dtype::F32 => {
            let mut bytes = vec![0u8; num_elements * 4];
            reader.read_exact(&mut bytes)?;
            bytes
                .chunks_exact(4)
                .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]) as f64)
                .collect()
        }
    };

    Ok(NpyArray {
        shape: header.shape,
        data,
    })
}

/// Read an `(N, 3)` array of points from a `.npy` file.
///
/// # Arguments
/// * `path` - Path to a `.npy` file.
///
/// # Returns
/// A [`PointCloud`] with the points only.
pub fn read_npy_points(path: impl AsRef<Path>) -> Result<PointCloud, NpyError> {
    let array = read_npy(path)?;
    if array.shape.len() != 2 || array.shape[1] != 3 {
        return Err(NpyError::InvalidShape {
            actual: array.shape,
            expected: "(N, 3)",
        });
    }

    let points = array
        .data
        .chunks_exact(3)
        .map(|p| [p[0], p[1], p[2]])
        .collect::<Vec<_>>();

    log::debug!("read {} points", points.len());

    Ok(PointCloud::from_points(points))
}

/// Write a `float64` array to a version 1.0 `.npy` file.
///
/// # Errors
///
/// [`NpyError::InvalidShape`] when the product of `shape` is not `data.len()`.
pub fn write_npy_f64(
    path: impl AsRef<Path>,
    shape: &[usize],
    data: &[f64],
) -> Result<(), NpyError> {
    check_extension(path.as_ref())?;
    if shape.iter().try_fold(1usize, |acc, &d| acc.checked_mul(d)) != Some(data.len()) {
        return Err(NpyError::InvalidShape {
            actual: shape.to_vec(),
            expected: "a shape matching the data length",
        });
    }

    let shape_str = match shape {
        [n] => format!("({n},)"),
        dims => format!(
            "({})",
            dims.iter()
                .map(|d| d.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        ),
    };
    let mut dict = format!("{{'descr': '<f8', 'fortran_order': False, 'shape': {shape_str}, }}");

    // magic + version + u16 length + dict + '\n' aligned to 64 bytes
    let unpadded = MAGIC.len() + 2 + 2 + dict.len() + 1;
    dict.push_str(&" ".repeat((64 - unpadded % 64) % 64));
    dict.push('\n');

    let header_len = u16::try_from(dict.len())
        .map_err(|_| NpyError::MalformedHeader("header too long".into()))?;

    let file = std::fs::File::create(path)?;
    let mut writer = BufWriter::new(file);
    writer.write_all(MAGIC)?;
    writer.write_all(&[1, 0])?;
    writer.write_all(&header_len.to_le_bytes())?;
    writer.write_all(dict.as_bytes())?;
    for v in data {
        writer.write_all(&v.to_le_bytes())?;
    }
    writer.flush()?;

    Ok(())
}
