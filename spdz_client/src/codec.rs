use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::{error::CodecError, fields::MpcField};

/// Append elements to buffer in order. There is no count prefix: the
/// receiver knows from the protocol step how many elements to expect.
pub fn pack_into<F: MpcField>(buf: &mut BytesMut, values: &[F]) {
    buf.reserve(values.len() * F::packed_len());
    for value in values {
        buf.put_slice(value.to_repr().as_ref());
    }
}

/// Pack elements into a fresh buffer.
pub fn pack<F: MpcField>(values: &[F]) -> Bytes {
    let mut buf = BytesMut::new();
    pack_into(&mut buf, values);
    buf.freeze()
}

/// Read `count` elements from the front of the buffer.
pub fn unpack<F: MpcField>(buf: &mut impl Buf, count: usize) -> Result<Vec<F>, CodecError> {
    let width = F::packed_len();
    let expected = count * width;
    if buf.remaining() < expected {
        return Err(CodecError::Truncated {
            expected,
            available: buf.remaining(),
        });
    }

    (0..count)
        .map(|i| {
            let mut repr = F::Repr::default();
            buf.copy_to_slice(repr.as_mut());
            F::from_repr_vartime(repr).ok_or(CodecError::NonCanonical(i))
        })
        .collect()
}

/// Read exactly `count` elements; leftover bytes mean the peers are out of step.
pub fn unpack_exact<F: MpcField>(mut buf: impl Buf, count: usize) -> Result<Vec<F>, CodecError> {
    let values = unpack(&mut buf, count)?;
    match buf.remaining() {
        0 => Ok(values),
        n => Err(CodecError::TrailingBytes(n)),
    }
}

#[cfg(test)]
mod tests {
    use crate::fields::{Mersenne127, Mersenne61};

    use super::*;

    #[test]
    fn test_pack_preserves_order() {
        let values: Vec<Mersenne61> = [3, 1, 2].into_iter().map(Mersenne61::from).collect();
        let buf = pack(&values);
        assert_eq!(buf.len(), 24);
        assert_eq!(&buf[..8], &[3, 0, 0, 0, 0, 0, 0, 0]);
        assert_eq!(unpack_exact::<Mersenne61>(buf, 3).unwrap(), values);
    }

    #[test]
    fn test_unpack_truncated() {
        let buf = pack(&[Mersenne127::from(7)]);
        let err = unpack_exact::<Mersenne127>(buf, 2).unwrap_err();
        assert_eq!(
            err,
            CodecError::Truncated {
                expected: 32,
                available: 16
            }
        );
    }

    #[test]
    fn test_unpack_trailing_bytes() {
        let buf = pack(&[Mersenne127::from(7), Mersenne127::from(8)]);
        let err = unpack_exact::<Mersenne127>(buf, 1).unwrap_err();
        assert_eq!(err, CodecError::TrailingBytes(16));
    }

    #[test]
    fn test_unpack_non_canonical() {
        let buf = Bytes::from(vec![0xff; 8]);
        let err = unpack_exact::<Mersenne61>(buf, 1).unwrap_err();
        assert_eq!(err, CodecError::NonCanonical(0));
    }
}
