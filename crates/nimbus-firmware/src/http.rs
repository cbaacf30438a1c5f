//! Plain HTTP over embassy-net TCP sockets.

use alloc::string::String;
use alloc::vec;
use core::net::Ipv4Addr;

use embassy_net::dns::DnsQueryType;
use embassy_net::tcp::TcpSocket;
use embassy_net::{IpAddress, Stack};
use embassy_time::with_timeout;
use embedded_io_async::Write;
use log::{debug, warn};

use nimbus_core::net::{HttpClient, HttpRequest, HttpResponse, NetError, parse_response};

const SOCKET_BUFFER: usize = 1536;
/// Responses larger than this are cut off and rejected as malformed.
const MAX_RESPONSE: usize = 4096;

/// One request per connection, addresses cached per host
///
/// The address found by [`HttpClient::resolve`] is reused by the following
/// [`HttpClient::send`] to the same host, so the precheck and the request
/// cost one DNS query.
pub struct StackHttp {
    stack: Stack<'static>,
    cached: Option<(String, Ipv4Addr)>,
}

impl StackHttp {
    pub fn new(stack: Stack<'static>) -> Self {
        Self {
            stack,
            cached: None,
        }
    }

    async fn lookup(&mut self, host: &str) -> Result<Ipv4Addr, NetError> {
        if let Ok(addr) = host.parse::<Ipv4Addr>() {
            return Ok(addr);
        }
        let answers = self
            .stack
            .dns_query(host, DnsQueryType::A)
            .await
            .map_err(|e| {
                debug!("dns: {} failed: {:?}", host, e);
                NetError::Resolve
            })?;
        answers
            .iter()
            .filter_map(|answer| match answer {
                IpAddress::Ipv4(addr) => Some(*addr),
                #[allow(unreachable_patterns)]
                _ => None,
            })
            .next()
            .ok_or(NetError::Resolve)
    }

    async fn exchange(
        &mut self,
        addr: Ipv4Addr,
        request: &HttpRequest,
    ) -> Result<HttpResponse, NetError> {
        let mut rx = vec![0u8; SOCKET_BUFFER];
        let mut tx = vec![0u8; SOCKET_BUFFER];
        let mut socket = TcpSocket::new(self.stack, &mut rx, &mut tx);
        socket.set_timeout(Some(request.timeout));

        socket.connect((addr, request.port)).await.map_err(|e| {
            warn!("http: connect to {}:{} failed: {:?}", addr, request.port, e);
            NetError::Connect
        })?;

        socket
            .write_all(&request.encode())
            .await
            .map_err(|_| NetError::Io)?;
        socket.flush().await.map_err(|_| NetError::Io)?;

        let mut raw: heapless::Vec<u8, MAX_RESPONSE> = heapless::Vec::new();
        let mut chunk = [0u8; 256];
        loop {
            let n = socket.read(&mut chunk).await.map_err(|_| NetError::Io)?;
            if n == 0 {
                break;
            }
            if raw.extend_from_slice(&chunk[..n]).is_err() {
                warn!("http: response exceeds {} bytes", MAX_RESPONSE);
                socket.abort();
                return Err(NetError::MalformedResponse);
            }
        }
        socket.close();

        parse_response(&raw)
    }
}

impl HttpClient for StackHttp {
    fn link_up(&self) -> bool {
        self.stack.is_config_up()
    }

    async fn resolve(&mut self, host: &str) -> Result<Ipv4Addr, NetError> {
        if !self.link_up() {
            return Err(NetError::LinkDown);
        }
        let addr = self.lookup(host).await?;
        self.cached = Some((String::from(host), addr));
        Ok(addr)
    }

    async fn send(&mut self, request: &HttpRequest) -> Result<HttpResponse, NetError> {
        if !self.link_up() {
            return Err(NetError::LinkDown);
        }
        let cached = self
            .cached
            .as_ref()
            .filter(|(host, _)| *host == request.host)
            .map(|(_, addr)| *addr);
        let addr = match cached {
            Some(addr) => addr,
            None => self.resolve(&request.host).await?,
        };

        match with_timeout(request.timeout, self.exchange(addr, request)).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(e)) => {
                // Re-resolve on the next request.
                self.cached = None;
                Err(e)
            }
            Err(_) => {
                self.cached = None;
                Err(NetError::Timeout)
            }
        }
    }
}
