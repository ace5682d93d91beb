use std::{fs, marker::PhantomData, path::Path};

use crate::{error::ConfigError, fields::MpcField};

/// Number of fractional bits used for real-valued inputs.
pub const DEFAULT_FIXED_PRECISION: u32 = 8;

/// Default extension degree of the parallel binary field.
pub const DEFAULT_GF2N_DEGREE: u32 = 40;

/// Name of the field parameter file inside a preprocessing directory.
pub const PARAMS_FILE: &str = "Params-Data";

/// Field parameters shared by every protocol step of a session.
///
/// The prime is fixed by the field type `F`; this object records the values
/// the engines were set up with and checks them against `F` once at startup.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldConfig<F> {
    modulus: u128,
    gf2n_degree: u32,
    fixed_precision: u32,
    _field: PhantomData<F>,
}

impl<F: MpcField> FieldConfig<F> {
    /// Validate given parameters against field `F`.
    pub fn new(modulus: u128, gf2n_degree: u32, fixed_precision: u32) -> Result<Self, ConfigError> {
        let expected = F::modulus().ok_or_else(|| {
            ConfigError::FieldParams("field modulus does not fit into 128 bits".into())
        })?;
        if modulus != expected {
            return Err(ConfigError::FieldParams(format!(
                "prime {} does not match the client field (prime {})",
                modulus, expected
            )));
        }
        if gf2n_degree == 0 {
            return Err(ConfigError::FieldParams("gf2n degree must be positive".into()));
        }
        // Scaled values must stay below p / 2 and inside i64.
        if fixed_precision >= 62 {
            return Err(ConfigError::FieldParams(format!(
                "fixed-point precision {} is too large",
                fixed_precision
            )));
        }

        Ok(Self {
            modulus,
            gf2n_degree,
            fixed_precision,
            _field: PhantomData,
        })
    }

    /// Parameters of the compiled field with default precision.
    pub fn for_field() -> Result<Self, ConfigError> {
        let modulus = F::modulus().ok_or_else(|| {
            ConfigError::FieldParams("field modulus does not fit into 128 bits".into())
        })?;
        Self::new(modulus, DEFAULT_GF2N_DEGREE, DEFAULT_FIXED_PRECISION)
    }

    /// Load `Params-Data` from a preprocessing directory.
    pub fn load(prep_dir: impl AsRef<Path>, fixed_precision: u32) -> Result<Self, ConfigError> {
        let path = prep_dir.as_ref().join(PARAMS_FILE);
        let contents = fs::read_to_string(&path).map_err(|source| ConfigError::Io {
            path: path.clone(),
            source,
        })?;
        let (modulus, gf2n_degree) = parse_params(&contents)?;
        Self::new(modulus, gf2n_degree, fixed_precision)
    }

    pub fn modulus(&self) -> u128 {
        self.modulus
    }

    pub fn gf2n_degree(&self) -> u32 {
        self.gf2n_degree
    }

    pub fn fixed_precision(&self) -> u32 {
        self.fixed_precision
    }

    /// Embed a signed integer, refusing values that would wrap around the modulus.
    pub fn encode_int(&self, value: i64) -> Result<F, ConfigError> {
        if value.unsigned_abs() as u128 > self.modulus / 2 {
            return Err(ConfigError::FixedPointRange(value as f64));
        }
        Ok(F::from_i64(value))
    }

    /// Scale by `2^precision`, round to nearest and embed into the field.
    pub fn encode_fixed(&self, value: f64) -> Result<F, ConfigError> {
        let scaled = (value * self.scale()).round();
        // i64::MAX is not representable as f64; the bound below excludes it.
        if !scaled.is_finite() || scaled.abs() >= 9.223372036854775807e18 {
            return Err(ConfigError::FixedPointRange(value));
        }
        self.encode_int(scaled as i64)
            .map_err(|_| ConfigError::FixedPointRange(value))
    }

    /// Inverse of `encode_fixed`, up to rounding.
    pub fn decode_fixed(&self, value: F) -> Option<f64> {
        value.to_i64().map(|x| x as f64 / self.scale())
    }

    fn scale(&self) -> f64 {
        (1u64 << self.fixed_precision) as f64
    }
}

/// Parse prime and gf2n degree, the first two whitespace-separated tokens.
fn parse_params(contents: &str) -> Result<(u128, u32), ConfigError> {
    let mut tokens = contents.split_whitespace();
    let modulus = tokens
        .next()
        .ok_or_else(|| ConfigError::FieldParams("missing prime".into()))?
        .parse()
        .map_err(|err| ConfigError::FieldParams(format!("invalid prime: {}", err)))?;
    let gf2n_degree = tokens
        .next()
        .ok_or_else(|| ConfigError::FieldParams("missing gf2n degree".into()))?
        .parse()
        .map_err(|err| ConfigError::FieldParams(format!("invalid gf2n degree: {}", err)))?;
    Ok((modulus, gf2n_degree))
}

#[cfg(test)]
mod tests {
    use crate::fields::{Mersenne127, Mersenne61};

    use super::*;

    #[test]
    fn test_fixed_point_example() {
        let config = FieldConfig::<Mersenne127>::for_field().unwrap();
        let encoded = config.encode_fixed(3.5).unwrap();
        assert_eq!(encoded, Mersenne127::from(896));
        assert_eq!(config.decode_fixed(encoded), Some(3.5));
    }

    #[test]
    fn test_fixed_point_error_bound() {
        let config = FieldConfig::<Mersenne127>::for_field().unwrap();
        let step = 2f64.powi(-8);
        for x in [0.0, -0.001, 1.0 / 3.0, -123.456, 1e6 + 0.77, -2.0 / 7.0] {
            let y = config.decode_fixed(config.encode_fixed(x).unwrap()).unwrap();
            assert!((x - y).abs() <= step, "{} decoded as {}", x, y);
        }
    }

    #[test]
    fn test_fixed_point_out_of_range() {
        let config = FieldConfig::<Mersenne61>::for_field().unwrap();
        assert!(config.encode_fixed(f64::NAN).is_err());
        assert!(config.encode_fixed(f64::INFINITY).is_err());
        // 2^60 * 2^8 exceeds p / 2 for p = 2^61 - 1.
        assert!(config.encode_fixed(2f64.powi(60)).is_err());
        assert!(config.encode_int(1 << 61).is_err());
        assert_eq!(config.encode_int(-3).unwrap(), -Mersenne61::from(3));
    }

    #[test]
    fn test_parse_params() {
        let config = FieldConfig::<Mersenne127>::for_field().unwrap();
        let contents = format!("{}\n40\n", config.modulus());
        assert_eq!(parse_params(&contents).unwrap(), (config.modulus(), 40));
        assert!(parse_params("").is_err());
        assert!(parse_params("17").is_err());
        assert!(parse_params("abc 40").is_err());
    }

    #[test]
    fn test_modulus_mismatch() {
        let err = FieldConfig::<Mersenne127>::new(170141183460469231731687303715885907969, 40, 8)
            .unwrap_err();
        assert!(matches!(err, ConfigError::FieldParams(_)));
    }

    #[test]
    fn test_load_params_file() {
        let dir = std::env::temp_dir().join(format!("spdz-prep-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(PARAMS_FILE), "2305843009213693951\n64\n").unwrap();

        let config = FieldConfig::<Mersenne61>::load(&dir, 12).unwrap();
        assert_eq!(config.modulus(), (1 << 61) - 1);
        assert_eq!(config.gf2n_degree(), 64);
        assert_eq!(config.fixed_precision(), 12);
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_load_missing_file() {
        let err = FieldConfig::<Mersenne127>::load("/nonexistent/prep", 8).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
