use std::{
    fs::File,
    io::{BufRead, BufReader},
    path::{Path, PathBuf},
};

use ndarray::{s, Array2, ArrayView1, Axis};

use crate::error::ConfigError;

/// Local dataset: one row per sample, comma-separated values.
#[derive(Clone, Debug, PartialEq)]
pub struct Dataset {
    rows: Array2<f64>,
}

/// What the client contributes to training.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ClientRole {
    /// Holds the labels in the last column of its dataset.
    LabelHolder,
    /// Holds feature columns only.
    FeatureHolder,
}

impl ClientRole {
    /// Client 0 holds the labels.
    pub fn for_client(client_id: u32) -> Self {
        if client_id == 0 {
            ClientRole::LabelHolder
        } else {
            ClientRole::FeatureHolder
        }
    }
}

/// Training part of the local dataset.
#[derive(Clone, Debug, PartialEq)]
pub struct TrainingData {
    /// Samples × features.
    pub features: Array2<f64>,
    /// Present only for the label holder.
    pub labels: Option<Vec<f64>>,
}

impl TrainingData {
    pub fn num_samples(&self) -> usize {
        self.features.nrows()
    }

    pub fn num_features(&self) -> usize {
        self.features.ncols()
    }

    /// Values of a single feature over all samples.
    pub fn feature(&self, index: usize) -> ArrayView1<f64> {
        self.features.column(index)
    }
}

impl Dataset {
    /// Path of a client's file: `<data_dir>/<name>/client_<id>.txt`.
    pub fn client_path(data_dir: impl AsRef<Path>, name: &str, client_id: u32) -> PathBuf {
        data_dir
            .as_ref()
            .join(name)
            .join(format!("client_{}.txt", client_id))
    }

    /// Load dataset from file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(BufReader::new(file))
    }

    /// Parse comma-separated rows. Blank lines are skipped.
    pub fn parse(reader: impl BufRead) -> Result<Self, ConfigError> {
        let mut values = Vec::new();
        let mut num_cols = None;
        let mut num_rows = 0;

        for (i, line) in reader.lines().enumerate() {
            let line_no = i + 1;
            let line = line.map_err(|err| ConfigError::Dataset {
                line: line_no,
                reason: err.to_string(),
            })?;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let row = parse_row(line).map_err(|reason| ConfigError::Dataset {
                line: line_no,
                reason,
            })?;
            match num_cols {
                None => num_cols = Some(row.len()),
                Some(n) if n != row.len() => {
                    return Err(ConfigError::Dataset {
                        line: line_no,
                        reason: format!("expected {} columns, found {}", n, row.len()),
                    })
                }
                _ => {}
            }
            values.extend(row);
            num_rows += 1;
        }

        // An empty file has zero samples.
        let num_cols = num_cols.unwrap_or(0);
        let rows = Array2::from_shape_vec((num_rows, num_cols), values).map_err(|err| {
            ConfigError::Dataset {
                line: num_rows,
                reason: err.to_string(),
            }
        })?;
        Ok(Self { rows })
    }

    pub fn num_samples(&self) -> usize {
        self.rows.nrows()
    }

    pub fn num_columns(&self) -> usize {
        self.rows.ncols()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Take the first `floor(n * fraction)` samples and separate labels by role.
    pub fn training_data(&self, role: ClientRole, fraction: f64) -> TrainingData {
        let num_training = (self.num_samples() as f64 * fraction) as usize;
        let head = self.rows.slice(s![..num_training, ..]);

        match role {
            ClientRole::FeatureHolder => TrainingData {
                features: head.to_owned(),
                labels: None,
            },
            ClientRole::LabelHolder => {
                let (features, labels) =
                    head.split_at(Axis(1), self.num_columns().saturating_sub(1));
                TrainingData {
                    features: features.to_owned(),
                    labels: Some(labels.iter().copied().collect()),
                }
            }
        }
    }
}

fn parse_row(line: &str) -> Result<Vec<f64>, String> {
    line.split(',')
        .map(|item| {
            let item = item.trim();
            match item.parse::<f64>() {
                Ok(x) if x.is_finite() => Ok(x),
                Ok(_) => Err(format!("non-finite value '{}'", item)),
                Err(err) => Err(format!("invalid value '{}': {}", item, err)),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;

    const DATA: &str = "1,2,0\n3,4,1\n\n5,6,0\n7,8,1\n9,10,1\n";

    #[test]
    fn test_parse() {
        let dataset = Dataset::parse(DATA.as_bytes()).unwrap();
        assert_eq!(dataset.num_samples(), 5);
        assert_eq!(dataset.num_columns(), 3);
    }

    #[test]
    fn test_label_holder_split() {
        let dataset = Dataset::parse(DATA.as_bytes()).unwrap();
        let training = dataset.training_data(ClientRole::LabelHolder, 0.8);
        assert_eq!(
            training.features,
            array![[1.0, 2.0], [3.0, 4.0], [5.0, 6.0], [7.0, 8.0]]
        );
        assert_eq!(training.labels, Some(vec![0.0, 1.0, 0.0, 1.0]));
        assert_eq!(training.feature(1).to_vec(), [2.0, 4.0, 6.0, 8.0]);
    }

    #[test]
    fn test_feature_holder_split() {
        let dataset = Dataset::parse(DATA.as_bytes()).unwrap();
        let training = dataset.training_data(ClientRole::FeatureHolder, 0.8);
        assert_eq!(training.num_samples(), 4);
        assert_eq!(training.num_features(), 3);
        assert_eq!(training.labels, None);
    }

    #[test]
    fn test_ragged_rows() {
        let err = Dataset::parse("1,2\n3\n".as_bytes()).unwrap_err();
        assert!(matches!(err, ConfigError::Dataset { line: 2, .. }));
    }

    #[test]
    fn test_invalid_values() {
        assert!(Dataset::parse("1,x\n".as_bytes()).is_err());
        assert!(Dataset::parse("1,inf\n".as_bytes()).is_err());
    }

    #[test]
    fn test_empty_file_has_no_samples() {
        let dataset = Dataset::parse("\n\n".as_bytes()).unwrap();
        assert!(dataset.is_empty());

        let training = dataset.training_data(ClientRole::LabelHolder, 0.8);
        assert_eq!(training.num_samples(), 0);
        assert_eq!(training.num_features(), 0);
        assert_eq!(training.labels, Some(vec![]));

        let training = dataset.training_data(ClientRole::FeatureHolder, 0.8);
        assert_eq!(training.num_samples(), 0);
        assert_eq!(training.labels, None);
    }

    #[test]
    fn test_roles() {
        assert_eq!(ClientRole::for_client(0), ClientRole::LabelHolder);
        assert_eq!(ClientRole::for_client(3), ClientRole::FeatureHolder);
    }

    #[test]
    fn test_client_path() {
        assert_eq!(
            Dataset::client_path("data", "bank", 2),
            PathBuf::from("data/bank/client_2.txt")
        );
    }
}
