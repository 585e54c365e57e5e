use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::sync::{broadcast, Semaphore};
use tracing::{debug, error, info, warn};

use crate::config::ServerConfig;
use crate::dns::enums::{Opcode, ResponseCode};
use crate::dns::DnsMessage;
use crate::resolver::QueryResolver;

const MAX_UDP_PACKET: usize = 4096;

/// Run the UDP listener until the shutdown signal arrives. Each datagram is
/// handled in its own task behind the concurrency semaphore.
pub async fn run_udp_server(
    config: ServerConfig,
    resolver: Arc<QueryResolver>,
    query_semaphore: Arc<Semaphore>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let sock: Arc<UdpSocket> = Arc::new(UdpSocket::bind(config.bind_addr).await?);
    info!("UDP listener on {}", config.bind_addr);

    let mut buf = vec![0u8; MAX_UDP_PACKET];

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => {
                info!("UDP listener stopping");
                break;
            }

            result = sock.recv_from(&mut buf) => {
                let (read_bytes, src_addr) = result?;

                let permit = match query_semaphore.clone().try_acquire_owned() {
                    Ok(permit) => permit,
                    Err(_) => {
                        warn!("max concurrent queries reached, dropping query from {}", src_addr);
                        continue;
                    }
                };

                let resolver = resolver.clone();
                let sock = sock.clone();
                let query_data = buf[..read_bytes].to_vec();

                tokio::spawn(async move {
                    let _permit = permit;

                    match handle_query(&query_data, &resolver).await {
                        Ok((response, max_payload)) => {
                            let wire = match serialize_for_udp(&response, max_payload) {
                                Ok(wire) => wire,
                                Err(e) => {
                                    error!("failed to serialize response: {}", e);
                                    return;
                                }
                            };
                            if let Err(e) = sock.send_to(&wire, src_addr).await {
                                error!("failed to send UDP response to {}: {:?}", src_addr, e);
                            }
                        }
                        Err(e) => {
                            debug!("dropping malformed UDP packet from {}: {}", src_addr, e);
                        }
                    }
                });
            }
        }
    }

    Ok(())
}

/// Run the TCP listener until the shutdown signal arrives. Messages are
/// length-prefixed (RFC 1035 section 4.2.2); a connection carries any number
/// of them.
pub async fn run_tcp_server(
    config: ServerConfig,
    resolver: Arc<QueryResolver>,
    query_semaphore: Arc<Semaphore>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let listener = TcpListener::bind(config.bind_addr).await?;
    info!("TCP listener on {}", config.bind_addr);

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => {
                info!("TCP listener stopping");
                break;
            }

            result = listener.accept() => {
                let (stream, src_addr) = result?;
                let resolver = resolver.clone();
                let query_semaphore = query_semaphore.clone();

                tokio::spawn(async move {
                    if let Err(e) =
                        handle_tcp_connection(stream, src_addr, resolver, query_semaphore).await
                    {
                        warn!("TCP connection error from {}: {:?}", src_addr, e);
                    }
                });
            }
        }
    }

    Ok(())
}

async fn handle_tcp_connection(
    mut stream: TcpStream,
    src_addr: std::net::SocketAddr,
    resolver: Arc<QueryResolver>,
    query_semaphore: Arc<Semaphore>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut length_buf = [0u8; 2];

    loop {
        match stream.read_exact(&mut length_buf).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                debug!("TCP connection closed by client {}", src_addr);
                break;
            }
            Err(e) => return Err(e.into()),
        }

        let message_length = u16::from_be_bytes(length_buf) as usize;
        let mut message_buf = vec![0u8; message_length];
        stream.read_exact(&mut message_buf).await?;

        let _permit = match query_semaphore.clone().try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                warn!(
                    "max concurrent queries reached, closing TCP connection from {}",
                    src_addr
                );
                break;
            }
        };

        match handle_query(&message_buf, &resolver).await {
            Ok((response, _)) => {
                let wire = response.serialize()?;
                stream.write_all(&(wire.len() as u16).to_be_bytes()).await?;
                stream.write_all(&wire).await?;
                stream.flush().await?;
            }
            Err(e) => {
                debug!("dropping malformed TCP message from {}: {}", src_addr, e);
                break;
            }
        }
    }

    Ok(())
}

/// Parse and answer one message. Returns the response together with the
/// largest UDP payload the client can take. Unparseable input is an error;
/// parseable-but-unserviceable input gets an error rcode instead.
async fn handle_query(
    buf: &[u8],
    resolver: &QueryResolver,
) -> Result<(DnsMessage, usize), Box<dyn std::error::Error + Send + Sync>> {
    let request = DnsMessage::parse(buf)?;
    let max_payload = request.max_udp_payload_size() as usize;

    debug!(
        "received query: id={}, opcode={}, questions={}, dnssec={}",
        request.header.id,
        request.header.opcode,
        request.header.qdcount,
        request.dnssec_requested(),
    );

    if !request.is_query() {
        return Err("expected a query, got a response".into());
    }

    match Opcode::from_u8(request.header.opcode) {
        Some(Opcode::Query) => {}
        _ => {
            debug!(
                "unsupported opcode {} in query id={}, answering NOTIMP",
                request.header.opcode, request.header.id
            );
            return Ok((error_response(&request, ResponseCode::NotImp), max_payload));
        }
    }

    if request.questions.is_empty() {
        debug!("query id={} has no questions, answering FORMERR", request.header.id);
        return Ok((error_response(&request, ResponseCode::FormErr), max_payload));
    }

    let response = resolver.resolve(&request).await;
    debug!(
        "answered query id={}: rcode={}, answers={}",
        request.header.id,
        response.header.rcode,
        response.answers.len()
    );

    Ok((response, max_payload))
}

fn error_response(request: &DnsMessage, rcode: ResponseCode) -> DnsMessage {
    let mut response = DnsMessage::reply_to(request);
    response.set_rcode(rcode);
    response
}

/// Serialize for UDP, swapping in a truncated reply when the client cannot
/// take the full message
fn serialize_for_udp(
    response: &DnsMessage,
    max_payload: usize,
) -> Result<Vec<u8>, crate::dns::ParseError> {
    let wire = response.serialize()?;
    if wire.len() <= max_payload {
        return Ok(wire);
    }

    debug!(
        "response too large for UDP ({} > {} bytes), truncating",
        wire.len(),
        max_payload
    );
    response.truncated().serialize()
}
