use std::str::FromStr;

use bytes::{Bytes, BytesMut};
use futures::{Sink, Stream};
use tracing::{debug, info, warn};

use crate::{
    dataset::TrainingData,
    error::{ConfigError, Result},
    fields::MpcField,
    indicators::{compute_feature_split_ivs, compute_label_class_ivs},
    protocol::SpdzClient,
    splits::{FeatureSplits, MAX_SPLIT_NUM, SPLIT_PARAMS_LEN},
};

/// How the engines return the outcome of training.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ResultMode {
    /// A single public integer from engine 0.
    Index,
    /// Shares of `size` values: fixed-point reals followed by an integer index.
    Vector(usize),
    /// Shares of an authenticated integer (y, r, w).
    Authenticated,
}

impl FromStr for ResultMode {
    type Err = ConfigError;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let invalid = || {
            ConfigError::InvalidArgument(format!(
                "unsupported result mode '{}'. Available options: index, vector:<size>, authenticated",
                s
            ))
        };
        match s {
            "index" => Ok(ResultMode::Index),
            "authenticated" => Ok(ResultMode::Authenticated),
            _ => match s.strip_prefix("vector:").map(str::parse::<usize>) {
                Some(Ok(size)) if size > 0 => Ok(ResultMode::Vector(size)),
                _ => Err(invalid()),
            },
        }
    }
}

/// Result reported by the engines.
#[derive(Clone, Debug, PartialEq)]
pub enum SessionResult {
    Index(i64),
    Vector { values: Vec<f64>, index: i64 },
}

/// Summary of a finished training round.
#[derive(Clone, Debug, PartialEq)]
pub struct TrainingReport {
    /// Private values sent, one triple consumed each.
    pub num_inputs: usize,
    pub result: SessionResult,
}

/// Number of private values a training round sends for given data.
pub fn private_input_count(data: &TrainingData) -> usize {
    let (n, m) = (data.num_samples(), data.num_features());
    let labels = match &data.labels {
        Some(labels) => labels.len() + compute_label_class_ivs(labels).len(),
        None => 0,
    };
    n * m + labels + m * SPLIT_PARAMS_LEN + m * 2 * MAX_SPLIT_NUM * n
}

/// Run a training round, then close the channels whatever the outcome.
pub async fn run_session<F, E, Channel>(
    mut client: SpdzClient<'_, F, Channel>,
    data: &TrainingData,
    mode: ResultMode,
) -> Result<TrainingReport>
where
    F: MpcField,
    Channel: Stream<Item = std::result::Result<BytesMut, E>> + Sink<Bytes> + Unpin,
{
    let report = train(&mut client, data, mode).await;
    if let Err(err) = client.close().await {
        warn!("failed to close engine channels: {}", err);
    }
    report
}

/// Send all training inputs and wait for the result.
///
/// Every private value goes in its own protocol round, in the order the
/// engines' training program reads them.
pub async fn train<F, E, Channel>(
    client: &mut SpdzClient<'_, F, Channel>,
    data: &TrainingData,
    mode: ResultMode,
) -> Result<TrainingReport>
where
    F: MpcField,
    Channel: Stream<Item = std::result::Result<BytesMut, E>> + Sink<Bytes> + Unpin,
{
    info!(
        samples = data.num_samples(),
        features = data.num_features(),
        inputs = private_input_count(data),
        "starting training round"
    );
    if data.num_samples() == 0 {
        warn!("no training samples, please check the dataset");
    }

    for &x in data.features.iter() {
        client.send_private_batch(&[x]).await?;
    }
    info!("finished sending training data");

    if let Some(labels) = &data.labels {
        for &y in labels {
            client.send_private_batch(&[y]).await?;
        }
        let class_ivs = compute_label_class_ivs(labels);
        debug!(classes = class_ivs.nrows(), "sending label class indicators");
        send_bits(client, class_ivs.iter()).await?;
        info!("finished sending training labels");
    }

    let columns: Vec<Vec<f64>> = (0..data.num_features())
        .map(|j| data.feature(j).to_vec())
        .collect();

    let params: Vec<_> = columns
        .iter()
        .enumerate()
        .map(|(j, column)| {
            let splits = FeatureSplits::compute(column);
            if let Some(issue) = splits.data_quality() {
                warn!(feature = j, ?issue, "feature has no usable split, please check the dataset");
            }
            debug!(feature = j, splits = splits.split_count(), "computed split parameters");
            splits.to_params()
        })
        .collect();

    for feature_params in &params {
        for &x in feature_params {
            client.send_private_batch(&[x]).await?;
        }
    }

    for (j, (column, feature_params)) in columns.iter().zip(&params).enumerate() {
        let (left, right) = compute_feature_split_ivs(column, feature_params);
        send_bits(client, left.iter()).await?;
        send_bits(client, right.iter()).await?;
        debug!(feature = j, rows = left.nrows(), "sent split indicators");
    }
    info!("finished sending split parameters");

    let result = match mode {
        ResultMode::Index => SessionResult::Index(client.receive_index().await?),
        ResultMode::Authenticated => {
            SessionResult::Index(client.receive_authenticated_result().await?)
        }
        ResultMode::Vector(size) => {
            let (values, index) = client.receive_result(size).await?;
            SessionResult::Vector { values, index }
        }
    };
    info!(?result, "received result");

    Ok(TrainingReport {
        num_inputs: client.num_inputs(),
        result,
    })
}

/// Send indicator bits one private value at a time.
async fn send_bits<'b, F, E, Channel>(
    client: &mut SpdzClient<'_, F, Channel>,
    bits: impl Iterator<Item = &'b u8>,
) -> Result<()>
where
    F: MpcField,
    Channel: Stream<Item = std::result::Result<BytesMut, E>> + Sink<Bytes> + Unpin,
{
    for &bit in bits {
        client.send_private_inputs(&[F::from(bit as u64)]).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;

    #[test]
    fn test_result_mode() {
        assert_eq!("index".parse::<ResultMode>().unwrap(), ResultMode::Index);
        assert_eq!(
            "authenticated".parse::<ResultMode>().unwrap(),
            ResultMode::Authenticated
        );
        assert_eq!(
            "vector:4".parse::<ResultMode>().unwrap(),
            ResultMode::Vector(4)
        );
        assert!("vector:0".parse::<ResultMode>().is_err());
        assert!("vector:x".parse::<ResultMode>().is_err());
        assert!("best".parse::<ResultMode>().is_err());
    }

    #[test]
    fn test_private_input_count() {
        let data = TrainingData {
            features: array![[1.0, 2.0], [3.0, 4.0], [5.0, 6.0]],
            labels: Some(vec![0.0, 1.0, 0.0]),
        };
        // 6 features, 3 labels, 2 classes x 3 samples, 2 x 9 params, 2 x 2 x 8 x 3 bits.
        assert_eq!(private_input_count(&data), 6 + 3 + 6 + 18 + 96);

        let data = TrainingData {
            labels: None,
            ..data
        };
        assert_eq!(private_input_count(&data), 6 + 18 + 96);
    }
}
