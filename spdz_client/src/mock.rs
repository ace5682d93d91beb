use futures::{SinkExt, StreamExt};
use rand::{rngs::SmallRng, SeedableRng};

use crate::{
    codec,
    error::{ProtocolViolation, Result, TransportError},
    fields::MpcField,
    protocol::{AuthenticatedResult, Triple},
    transport::{mock_engine_channels, DuplexChannel, EngineChannels},
};

/// Buffer size of in-memory channels.
pub const MOCK_BUFFER_SIZE: usize = 1 << 16;

/// Insecure dealer of additively shared triples.
pub struct FakeTripleDealer<F> {
    num_engines: usize,
    rng: SmallRng,
    _field: std::marker::PhantomData<F>,
}

impl<F: MpcField> FakeTripleDealer<F> {
    /// Create new instance.
    pub fn new(num_engines: usize, seed: u8) -> Self {
        Self {
            num_engines,
            rng: SmallRng::from_seed([seed; 32]),
            _field: std::marker::PhantomData,
        }
    }

    /// Random additive sharing of given value.
    pub fn share(&mut self, value: F) -> Vec<F> {
        let mut shares: Vec<F> = (1..self.num_engines)
            .map(|_| F::random(&mut self.rng))
            .collect();
        let sum = shares.iter().fold(F::zero(), |acc, &x| acc + x);
        shares.push(value - sum);
        shares
    }

    /// Random triple and its sharing, one share per engine.
    pub fn next_triple(&mut self) -> (Triple<F>, Vec<Triple<F>>) {
        let a = F::random(&mut self.rng);
        let b = F::random(&mut self.rng);
        let triple = Triple::new(a, b, a * b);
        let shares = self
            .share(a)
            .into_iter()
            .zip(self.share(b))
            .zip(self.share(a * b))
            .map(|((a, b), c)| Triple::new(a, b, c))
            .collect();
        (triple, shares)
    }
}

/// Engine side of a single connection.
pub struct MockEngine {
    id: usize,
    channel: DuplexChannel,
}

impl MockEngine {
    pub fn new(id: usize, channel: DuplexChannel) -> Self {
        Self { id, channel }
    }

    /// Send packed elements as one buffer.
    pub async fn send<F: MpcField>(&mut self, values: &[F]) -> Result<()> {
        self.channel
            .send(codec::pack(values))
            .await
            .map_err(|_| TransportError::Send(self.id))?;
        Ok(())
    }

    /// Receive one buffer holding exactly `count` elements.
    pub async fn receive<F: MpcField>(&mut self, count: usize) -> Result<Vec<F>> {
        let buf = match self.channel.next().await {
            Some(Ok(buf)) => buf,
            Some(Err(_)) => return Err(TransportError::Recv(self.id).into()),
            None => return Err(TransportError::Closed(self.id).into()),
        };
        Ok(codec::unpack_exact(buf, count)?)
    }

    /// True if the client closed the connection without sending anything further.
    pub async fn is_closed(&mut self) -> bool {
        self.channel.next().await.is_none()
    }
}

/// Cohort of engine doubles that plays the engine side of every protocol step.
pub struct MockCohort<F> {
    dealer: FakeTripleDealer<F>,
    engines: Vec<MockEngine>,
    corrupt_next: bool,
}

impl<F: MpcField> MockCohort<F> {
    /// Create cohort and the matching client-side channels.
    pub fn new(num_engines: usize, seed: u8) -> (Self, EngineChannels<DuplexChannel>) {
        let (channels, ends) = mock_engine_channels(num_engines, MOCK_BUFFER_SIZE);
        let cohort = Self {
            dealer: FakeTripleDealer::new(num_engines, seed),
            engines: ends
                .into_iter()
                .enumerate()
                .map(|(id, channel)| MockEngine::new(id, channel))
                .collect(),
            corrupt_next: false,
        };
        (cohort, channels)
    }

    pub fn engines(&mut self) -> &mut [MockEngine] {
        &mut self.engines
    }

    /// Make the next dealt triple inconsistent, as a cheating engine would.
    pub fn corrupt_next_triple(&mut self) {
        self.corrupt_next = true;
    }

    /// Deal `count` triples and send every engine its shares.
    pub async fn send_triples(&mut self, count: usize) -> Result<Vec<Triple<F>>> {
        let mut triples = Vec::with_capacity(count);
        let mut shares = vec![Vec::with_capacity(count * 3); self.engines.len()];
        for _ in 0..count {
            let (mut triple, mut triple_shares) = self.dealer.next_triple();
            if self.corrupt_next {
                self.corrupt_next = false;
                triple.c += F::one();
                triple_shares[0].c += F::one();
            }
            for (engine_shares, share) in shares.iter_mut().zip(triple_shares) {
                engine_shares.extend(share.to_array());
            }
            triples.push(triple);
        }
        for (engine, engine_shares) in self.engines.iter_mut().zip(&shares) {
            engine.send(engine_shares.as_slice()).await?;
        }
        Ok(triples)
    }

    /// Receive the masked broadcast and check every engine got the same values.
    pub async fn receive_masked(&mut self, count: usize) -> Result<Vec<F>> {
        let mut masked: Option<Vec<F>> = None;
        for engine in self.engines.iter_mut() {
            let values = engine.receive(count).await?;
            match &masked {
                Some(first) if *first != values => {
                    return Err(ProtocolViolation::InconsistentBroadcast(engine.id).into())
                }
                Some(_) => {}
                None => masked = Some(values),
            }
        }
        Ok(masked.unwrap_or_default())
    }

    /// Serve one input round and recover the private values as a trusted decoder would.
    pub async fn serve_inputs(&mut self, count: usize) -> Result<Vec<F>> {
        let triples = self.send_triples(count).await?;
        let masked = self.receive_masked(count).await?;
        Ok(masked
            .into_iter()
            .zip(triples)
            .map(|(y, triple)| y - triple.a)
            .collect())
    }

    /// Serve `rounds` single-value input rounds.
    pub async fn serve_single_inputs(&mut self, rounds: usize) -> Result<Vec<F>> {
        let mut values = Vec::with_capacity(rounds);
        for _ in 0..rounds {
            values.extend(self.serve_inputs(1).await?);
        }
        Ok(values)
    }

    /// Receive public values broadcast in the clear.
    pub async fn receive_public(&mut self, count: usize) -> Result<Vec<F>> {
        self.receive_masked(count).await
    }

    /// Send fresh additive shares of given values.
    pub async fn send_shared(&mut self, values: &[F]) -> Result<()> {
        let mut shares = vec![Vec::with_capacity(values.len()); self.engines.len()];
        for &value in values {
            for (engine_shares, share) in shares.iter_mut().zip(self.dealer.share(value)) {
                engine_shares.push(share);
            }
        }
        for (engine, engine_shares) in self.engines.iter_mut().zip(&shares) {
            engine.send(engine_shares.as_slice()).await?;
        }
        Ok(())
    }

    /// Send shares of y authenticated with a random r.
    pub async fn send_authenticated(&mut self, y: F) -> Result<AuthenticatedResult<F>> {
        let r = F::random(&mut self.dealer.rng);
        let result = AuthenticatedResult { y, r, w: y * r };
        self.send_shared(&[result.y, result.r, result.w]).await?;
        Ok(result)
    }

    /// Send a public value from engine 0.
    pub async fn send_index(&mut self, value: F) -> Result<()> {
        self.engines[0].send(&[value]).await
    }
}

#[cfg(test)]
mod tests {
    use ff::Field;

    use crate::{
        error::ClientError,
        fields::Mersenne61,
        transport::framed_duplex,
    };

    use super::*;

    #[test]
    fn test_dealer_shares_sum_to_value() {
        let mut dealer = FakeTripleDealer::<Mersenne61>::new(3, 7);
        let shares = dealer.share(Mersenne61::from(42));
        assert_eq!(shares.len(), 3);
        let sum = shares.iter().fold(Mersenne61::zero(), |acc, &x| acc + x);
        assert_eq!(sum, Mersenne61::from(42));
    }

    #[test]
    fn test_dealer_triples_are_consistent() {
        let mut dealer = FakeTripleDealer::<Mersenne61>::new(2, 1);
        for _ in 0..10 {
            let (triple, shares) = dealer.next_triple();
            assert!(triple.is_consistent());
            let mut sum = Triple::zero();
            for share in shares {
                sum += share;
            }
            assert_eq!(sum, triple);
        }
    }

    #[tokio::test]
    async fn test_diverging_broadcast_is_reported() {
        let (mut client_a, engine_a) = framed_duplex(MOCK_BUFFER_SIZE);
        let (mut client_b, engine_b) = framed_duplex(MOCK_BUFFER_SIZE);
        let mut cohort = MockCohort::<Mersenne61> {
            dealer: FakeTripleDealer::new(2, 3),
            engines: vec![MockEngine::new(0, engine_a), MockEngine::new(1, engine_b)],
            corrupt_next: false,
        };

        client_a
            .send(codec::pack(&[Mersenne61::from(5)]))
            .await
            .unwrap();
        client_b
            .send(codec::pack(&[Mersenne61::from(6)]))
            .await
            .unwrap();

        let err = cohort.receive_masked(1).await.unwrap_err();
        assert!(matches!(
            err,
            ClientError::Protocol(ProtocolViolation::InconsistentBroadcast(1))
        ));
    }
}
