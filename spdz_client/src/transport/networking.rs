use tokio::{
    io::AsyncWriteExt,
    net::TcpStream,
};
use tracing::{debug, info};

use crate::error::TransportError;

use super::{wrap_channel, EngineChannels, FramedChannel};

/// Framed network channel.
pub type NetChannel = FramedChannel<TcpStream>;

/// Address of a single engine.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EngineAddress {
    pub host: String,
    pub port: u16,
}

impl EngineAddress {
    /// Addresses for the given hosts, engine `i` listening on `port_base + i`.
    /// Returns None if the last port does not fit into `u16`.
    pub fn with_port_base(hosts: &[String], port_base: u16) -> Option<Vec<Self>> {
        hosts
            .iter()
            .enumerate()
            .map(|(i, host)| {
                let port = u16::try_from(i).ok().and_then(|i| port_base.checked_add(i))?;
                Some(EngineAddress {
                    host: host.clone(),
                    port,
                })
            })
            .collect()
    }
}

/// Connect to every engine and announce the client ID.
///
/// Any failed connection aborts the whole setup; a partial cohort is useless.
pub async fn connect_engines(
    engines: &[EngineAddress],
    client_id: u32,
) -> Result<EngineChannels<NetChannel>, TransportError> {
    let mut channels = Vec::with_capacity(engines.len());
    for (id, address) in engines.iter().enumerate() {
        let socket = connect_to_engine(id, address, client_id).await?;
        info!(engine = id, host = %address.host, port = address.port, "connected to engine");
        channels.push(wrap_channel(socket));
    }
    Ok(EngineChannels::new(channels))
}

/// Open connection to a single engine. The first bytes are the client ID.
async fn connect_to_engine(
    id: usize,
    address: &EngineAddress,
    client_id: u32,
) -> Result<TcpStream, TransportError> {
    let connect_error = |source| TransportError::Connect {
        engine: id,
        address: format!("{}:{}", address.host, address.port),
        source,
    };

    let mut socket = TcpStream::connect((address.host.as_str(), address.port))
        .await
        .map_err(connect_error)?;
    socket.set_nodelay(true).map_err(connect_error)?;
    socket
        .write_u32_le(client_id)
        .await
        .map_err(connect_error)?;
    socket.flush().await.map_err(connect_error)?;

    debug!(engine = id, client_id, "sent client identifier");
    Ok(socket)
}
