use std::ops::AddAssign;

use bytes::{Bytes, BytesMut};
use futures::{Sink, Stream};

use crate::{
    codec,
    error::{ConfigError, ProtocolViolation, Result},
    fields::MpcField,
    params::FieldConfig,
    transport::EngineChannels,
};

/// Multiplication triple (a, b, c) with ab = c once all shares are summed.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Triple<F> {
    pub a: F,
    pub b: F,
    pub c: F,
}

impl<F: MpcField> Triple<F> {
    pub fn new(a: F, b: F, c: F) -> Self {
        Self { a, b, c }
    }

    pub fn zero() -> Self {
        Self::new(F::zero(), F::zero(), F::zero())
    }

    /// Check relation ab = c.
    pub fn is_consistent(&self) -> bool {
        self.a * self.b == self.c
    }

    /// Field elements in wire order.
    pub fn to_array(&self) -> [F; 3] {
        [self.a, self.b, self.c]
    }
}

impl<F: MpcField> AddAssign for Triple<F> {
    fn add_assign(&mut self, rhs: Self) {
        self.a += rhs.a;
        self.b += rhs.b;
        self.c += rhs.c;
    }
}

/// Output value y authenticated with a random r and w = yr.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct AuthenticatedResult<F> {
    pub y: F,
    pub r: F,
    pub w: F,
}

impl<F: MpcField> AuthenticatedResult<F> {
    /// Check relation yr = w.
    pub fn is_authentic(&self) -> bool {
        self.y * self.r == self.w
    }

    /// Return y if the result is authentic.
    pub fn verify(self) -> std::result::Result<F, ProtocolViolation> {
        if self.is_authentic() {
            Ok(self.y)
        } else {
            Err(ProtocolViolation::UnauthenticatedResult)
        }
    }
}

/// Protocol client for a fixed cohort of engines.
///
/// Inputs are provided following <https://eprint.iacr.org/2015/1006.pdf>:
/// every engine sends its shares of one fresh multiplication triple per
/// private value, the client checks the reconstructed triples and broadcasts
/// `value + a`. Outputs are returned as additive shares and summed here.
pub struct SpdzClient<'a, F, Channel> {
    config: &'a FieldConfig<F>,
    channels: EngineChannels<Channel>,
    num_inputs: usize,
}

impl<'a, F, Channel> SpdzClient<'a, F, Channel> {
    pub fn new(config: &'a FieldConfig<F>, channels: EngineChannels<Channel>) -> Self {
        Self {
            config,
            channels,
            num_inputs: 0,
        }
    }

    /// Number of engines.
    pub fn num_engines(&self) -> usize {
        self.channels.num_engines()
    }

    /// Number of private values sent so far. Equals the number of triples consumed.
    pub fn num_inputs(&self) -> usize {
        self.num_inputs
    }

    /// Release the underlying channels.
    pub fn into_channels(self) -> EngineChannels<Channel> {
        self.channels
    }
}

impl<'a, F, E, Channel> SpdzClient<'a, F, Channel>
where
    F: MpcField,
    Channel: Stream<Item = std::result::Result<BytesMut, E>> + Sink<Bytes> + Unpin,
{
    /// Broadcast public integers in the clear.
    pub async fn send_public_parameters(&mut self, values: &[i64]) -> Result<()> {
        let elements = values
            .iter()
            .map(|&x| self.config.encode_int(x))
            .collect::<std::result::Result<Vec<F>, _>>()?;
        self.channels.send_all(codec::pack(&elements)).await?;
        Ok(())
    }

    /// Secret-share private field elements among the engines.
    ///
    /// Nothing is sent unless every reconstructed triple is consistent.
    pub async fn send_private_inputs(&mut self, values: &[F]) -> Result<()> {
        let triples = self.gather_triples(values.len()).await?;

        if let Some(i) = triples.iter().position(|t| !t.is_consistent()) {
            return Err(ProtocolViolation::InconsistentTriple(i).into());
        }

        let masked: Vec<F> = values
            .iter()
            .zip(&triples)
            .map(|(&value, triple)| value + triple.a)
            .collect();
        self.channels.send_all(codec::pack(&masked)).await?;
        self.num_inputs += values.len();
        Ok(())
    }

    /// Secret-share real values in fixed-point representation.
    pub async fn send_private_batch(&mut self, values: &[f64]) -> Result<()> {
        let elements = values
            .iter()
            .map(|&x| self.config.encode_fixed(x))
            .collect::<std::result::Result<Vec<F>, _>>()?;
        self.send_private_inputs(&elements).await
    }

    /// Receive `size` shared values. All but the last are fixed-point reals,
    /// the last one is an integer index.
    ///
    /// This path is not authenticated; see `receive_authenticated_result`.
    pub async fn receive_result(&mut self, size: usize) -> Result<(Vec<f64>, i64)> {
        if size == 0 {
            return Err(ConfigError::InvalidArgument(
                "result vector must hold at least the index".into(),
            )
            .into());
        }
        let sums = self.gather_sums(size).await?;

        let (values, index) = (&sums[..size - 1], sums[size - 1]);
        let values = values
            .iter()
            .enumerate()
            .map(|(i, &x)| {
                self.config
                    .decode_fixed(x)
                    .ok_or(ProtocolViolation::SignedOverflow(i))
            })
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let index = index
            .to_i64()
            .ok_or(ProtocolViolation::SignedOverflow(size - 1))?;
        Ok((values, index))
    }

    /// Receive shares of (y, r, w), check yr = w and return y as an integer.
    pub async fn receive_authenticated_result(&mut self) -> Result<i64> {
        let sums = self.gather_sums(3).await?;
        let result = AuthenticatedResult {
            y: sums[0],
            r: sums[1],
            w: sums[2],
        };
        let y = result.verify()?;
        y.to_i64()
            .ok_or_else(|| ProtocolViolation::SignedOverflow(0).into())
    }

    /// Receive a single public integer from engine 0.
    pub async fn receive_index(&mut self) -> Result<i64> {
        let buf = self.channels.receive(0).await?;
        let value: Vec<F> = codec::unpack_exact(buf, 1)?;
        value[0]
            .to_i64()
            .ok_or_else(|| ProtocolViolation::SignedOverflow(0).into())
    }

    /// Close all channels.
    pub async fn close(self) -> Result<()> {
        self.channels.close_all().await?;
        Ok(())
    }

    /// Receive `count` triple shares from every engine and sum them in engine order.
    async fn gather_triples(&mut self, count: usize) -> Result<Vec<Triple<F>>> {
        let mut triples = vec![Triple::zero(); count];
        for engine in 0..self.channels.num_engines() {
            let buf = self.channels.receive(engine).await?;
            let shares: Vec<F> = codec::unpack_exact(buf, count * 3)?;
            for (triple, share) in triples.iter_mut().zip(shares.chunks_exact(3)) {
                *triple += Triple::new(share[0], share[1], share[2]);
            }
        }
        Ok(triples)
    }

    /// Receive `count` shares from every engine and sum them elementwise in engine order.
    async fn gather_sums(&mut self, count: usize) -> Result<Vec<F>> {
        let mut sums = vec![F::zero(); count];
        for engine in 0..self.channels.num_engines() {
            let buf = self.channels.receive(engine).await?;
            let shares: Vec<F> = codec::unpack_exact(buf, count)?;
            for (sum, share) in sums.iter_mut().zip(shares) {
                *sum += share;
            }
        }
        Ok(sums)
    }
}

#[cfg(test)]
mod tests {
    use ff::Field;

    use crate::fields::Mersenne127;

    use super::*;

    type Fp = Mersenne127;

    #[test]
    fn test_triple_consistency() {
        let t = Triple::new(Fp::from(3), Fp::from(5), Fp::from(15));
        assert!(t.is_consistent());
        assert!(!Triple::new(Fp::from(3), Fp::from(5), Fp::from(16)).is_consistent());
        assert!(Triple::<Fp>::zero().is_consistent());
    }

    #[test]
    fn test_triple_share_sum() {
        let mut sum = Triple::zero();
        sum += Triple::new(Fp::from(1), Fp::from(2), Fp::from(3));
        sum += Triple::new(Fp::from(2), Fp::from(3), -Fp::from(3) + Fp::from(15));
        assert_eq!(sum, Triple::new(Fp::from(3), Fp::from(5), Fp::from(15)));
        assert!(sum.is_consistent());
    }

    #[test]
    fn test_authenticated_result() {
        let ok = AuthenticatedResult {
            y: Fp::from(456),
            r: Fp::from(77),
            w: Fp::from(456 * 77),
        };
        assert_eq!(ok.verify(), Ok(Fp::from(456)));

        let forged = AuthenticatedResult {
            w: ok.w + Fp::one(),
            ..ok
        };
        assert_eq!(
            forged.verify(),
            Err(ProtocolViolation::UnauthenticatedResult)
        );
    }
}
