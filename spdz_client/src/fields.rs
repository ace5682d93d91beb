use ff::PrimeField;

mod mersenne_61 {
    use ff::PrimeField;

    /// Finite field mod 2^61-1.
    #[derive(PrimeField)]
    #[PrimeFieldModulus = "2305843009213693951"]
    #[PrimeFieldGenerator = "37"]
    #[PrimeFieldReprEndianness = "little"]
    pub struct Mersenne61([u64; 1]);
}

mod mersenne_127 {
    use ff::PrimeField;

    /// Finite field mod 2^127-1.
    #[derive(PrimeField)]
    #[PrimeFieldModulus = "170141183460469231731687303715884105727"]
    #[PrimeFieldGenerator = "43"]
    #[PrimeFieldReprEndianness = "little"]
    pub struct Mersenne127([u64; 2]);
}

pub use mersenne_127::{Mersenne127, Mersenne127Repr};
pub use mersenne_61::{Mersenne61, Mersenne61Repr};

/// Prime field usable by the client protocol.
///
/// Elements are exchanged in their canonical little-endian representation,
/// and integers are embedded with the usual signed convention: residues above
/// `(p - 1) / 2` stand for negative numbers.
pub trait MpcField: PrimeField {
    /// Width in bytes of a packed element.
    fn packed_len() -> usize {
        Self::Repr::default().as_ref().len()
    }

    /// Canonical residue as an integer, if it fits into 128 bits.
    fn to_u128(&self) -> Option<u128> {
        repr_to_u128(self.to_repr().as_ref())
    }

    /// Embed a signed integer.
    fn from_i64(value: i64) -> Self {
        let magnitude = Self::from(value.unsigned_abs());
        if value < 0 {
            -magnitude
        } else {
            magnitude
        }
    }

    /// Interpret the element as a signed integer.
    /// Returns None if the magnitude does not fit into `i64`.
    fn to_i64(&self) -> Option<i64> {
        let positive = self.to_u128()?;
        let negative = (-*self).to_u128()?;
        if positive <= negative {
            i64::try_from(positive).ok()
        } else {
            i64::try_from(negative).ok().map(|x| -x)
        }
    }

    /// Modulus of the field, if it fits into 128 bits.
    fn modulus() -> Option<u128> {
        (-Self::one()).to_u128().map(|x| x + 1)
    }
}

impl<T: PrimeField> MpcField for T {}

/// Read little-endian bytes into an integer, rejecting anything wider than 128 bits.
fn repr_to_u128(bytes: &[u8]) -> Option<u128> {
    if bytes.iter().skip(16).any(|&b| b != 0) {
        return None;
    }
    Some(
        bytes
            .iter()
            .take(16)
            .rev()
            .fold(0u128, |acc, &b| (acc << 8) | b as u128),
    )
}
