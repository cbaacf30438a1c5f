//! Real HTTP transport for talking to the actual cloud services from a
//! desktop.

use std::io::ErrorKind as IoErrorKind;
use std::net::{Ipv4Addr, SocketAddr, ToSocketAddrs};
use std::time::Duration;

use log::debug;

use nimbus_core::net::{HttpClient, HttpRequest, HttpResponse, NetError};

use crate::network::SimNetwork;

/// Blocking `ureq` client. Link availability still follows the simulated
/// radio so outages exercise the same code paths as on the device.
#[derive(Clone)]
pub struct LiveHttp {
    network: SimNetwork,
}

impl LiveHttp {
    pub fn new(network: SimNetwork) -> Self {
        Self { network }
    }

    fn agent(timeout: Duration) -> ureq::Agent {
        ureq::AgentBuilder::new()
            .timeout(timeout)
            .max_idle_connections(0)
            .user_agent(concat!("nimbus/", env!("CARGO_PKG_VERSION")))
            .build()
    }
}

fn transport_error(error: &ureq::Transport) -> NetError {
    match error.kind() {
        ureq::ErrorKind::Dns => NetError::Resolve,
        ureq::ErrorKind::ConnectionFailed => NetError::Connect,
        ureq::ErrorKind::Io => NetError::Timeout,
        _ => NetError::Io,
    }
}

impl HttpClient for LiveHttp {
    fn link_up(&self) -> bool {
        self.network.link_up()
    }

    async fn resolve(&mut self, host: &str) -> Result<Ipv4Addr, NetError> {
        if !self.network.link_up() {
            return Err(NetError::LinkDown);
        }
        let addrs = (host, 80).to_socket_addrs().map_err(|e| {
            debug!("Resolving {host} failed: {e}");
            NetError::Resolve
        })?;
        addrs
            .filter_map(|addr| match addr {
                SocketAddr::V4(v4) => Some(*v4.ip()),
                SocketAddr::V6(_) => None,
            })
            .next()
            .ok_or(NetError::Resolve)
    }

    async fn send(&mut self, request: &HttpRequest) -> Result<HttpResponse, NetError> {
        if !self.network.link_up() {
            return Err(NetError::LinkDown);
        }

        let timeout = Duration::from_micros(request.timeout.as_micros());
        let url = request.url();
        debug!("{} {}", request.method.as_str(), url);

        let call = Self::agent(timeout).request(request.method.as_str(), &url);
        let result = match &request.body {
            Some(body) => call
                .set("Content-Type", "application/json")
                .send_string(body),
            None => call.call(),
        };

        match result {
            Ok(response) => {
                let status = response.status();
                let body = response.into_string().map_err(|e| match e.kind() {
                    IoErrorKind::TimedOut | IoErrorKind::WouldBlock => NetError::Timeout,
                    _ => NetError::Io,
                })?;
                Ok(HttpResponse { status, body })
            }
            Err(ureq::Error::Status(status, response)) => Ok(HttpResponse {
                status,
                body: response.into_string().unwrap_or_default(),
            }),
            Err(ureq::Error::Transport(transport)) => {
                debug!("Transport error: {transport}");
                Err(transport_error(&transport))
            }
        }
    }
}
