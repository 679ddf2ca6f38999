use crate::error::TransportError;
use crate::flv::flv_buffer::FlvBuffer;
use crate::flv::flv_tag::FlvTag;
use crate::flv::FLV_TAG_TYPE_META;
use crate::rtmp::url::RtmpUrl;
use crate::transport::Transport;
use bytes::{BufMut, Bytes};
use log::{debug, info, trace, warn};
use rml_rtmp::chunk_io::{ChunkDeserializer, ChunkSerializer};
use rml_rtmp::handshake::{Handshake, HandshakeProcessResult, PeerType};
use rml_rtmp::messages::{MessagePayload, RtmpMessage};
use rml_rtmp::rml_amf0::Amf0Value;
use rml_rtmp::time::RtmpTimestamp;
use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::{Shutdown, TcpStream};
use std::thread::JoinHandle;
use std::time::Duration;

const SETUP_TIMEOUT: Duration = Duration::from_secs(10);
const READ_BUFFER_SIZE: usize = 4096;

const TRANSACTION_CONNECT: f64 = 1.0;
const TRANSACTION_CREATE_STREAM: f64 = 2.0;
const TRANSACTION_PUBLISH: f64 = 3.0;
const TRANSACTION_DELETE_STREAM: f64 = 4.0;

fn protocol_error(context: &str, e: impl std::fmt::Debug) -> TransportError {
    TransportError::Protocol(format!("{context}: {e:?}"))
}

/// Publishes the FLV stream to an RTMP server.
///
/// Each flushed chunk is split back into FLV tags, and every tag is sent as
/// one RTMP message on the published stream. The `onMetaData` tag goes out as
/// `@setDataFrame`.
pub struct RtmpTransport {
    stream: TcpStream,
    serializer: ChunkSerializer,
    flv_buffer: FlvBuffer,
    stream_id: u32,
    reader: Option<JoinHandle<()>>,
    closed: bool,
}

impl RtmpTransport {
    /// Connects to `url` and gets as far as `NetStream.Publish.Start`.
    ///
    /// # Parameters
    ///
    /// * `url` - `rtmp://host[:port]/app/stream_key`
    ///
    /// # Errors
    ///
    /// * [`TransportError::InvalidUrl`] if the URL cannot be parsed
    /// * [`TransportError::Io`] on socket errors, including the setup timeout
    /// * [`TransportError::Protocol`] if the server rejects a command
    pub fn connect(url: &str) -> Result<RtmpTransport, TransportError> {
        let url = RtmpUrl::parse(url)?;
        let stream = TcpStream::connect((url.host.as_str(), url.port))?;
        stream.set_nodelay(true)?;
        stream.set_read_timeout(Some(SETUP_TIMEOUT))?;

        let mut setup = ClientSetup::new(stream);
        setup.handshake()?;
        setup.connect(&url)?;
        let stream_id = setup.create_stream()?;
        setup.publish(&url.stream_key, stream_id)?;
        let ClientSetup {
            stream, serializer, ..
        } = setup;

        stream.set_read_timeout(None)?;
        let reader = spawn_reader(stream.try_clone()?)?;

        info!(
            "Publishing to rtmp://{}:{}/{} (stream id {stream_id}).",
            url.host, url.port, url.app
        );
        Ok(RtmpTransport {
            stream,
            serializer,
            flv_buffer: FlvBuffer::new(),
            stream_id,
            reader: Some(reader),
            closed: false,
        })
    }

    fn send_tag(&mut self, mut tag: FlvTag) -> Result<(), TransportError> {
        tag.header.stream_id = self.stream_id;
        let payload = flv_tag_to_message_payload(tag);
        let packet = self
            .serializer
            .serialize(&payload, false, false)
            .map_err(|e| protocol_error("serialize media message", e))?;
        self.stream.write_all(&packet.bytes)?;
        Ok(())
    }

    fn delete_stream(&mut self) -> Result<(), TransportError> {
        let payload = RtmpMessage::Amf0Command {
            command_name: "deleteStream".to_string(),
            transaction_id: TRANSACTION_DELETE_STREAM,
            command_object: Amf0Value::Null,
            additional_arguments: vec![Amf0Value::Number(self.stream_id as f64)],
        }
        .into_message_payload(RtmpTimestamp { value: 0 }, 0)
        .map_err(|e| protocol_error("create deleteStream command", e))?;
        let packet = self
            .serializer
            .serialize(&payload, false, false)
            .map_err(|e| protocol_error("serialize deleteStream command", e))?;
        self.stream.write_all(&packet.bytes)?;
        Ok(())
    }
}

impl Transport for RtmpTransport {
    fn write(&mut self, data: &[u8]) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        self.flv_buffer.write_data(data);
        while let Some(tag) = self.flv_buffer.get_flv_tag() {
            self.send_tag(tag)?;
        }
        Ok(())
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Err(e) = self.delete_stream() {
            warn!("Failed to send deleteStream: {e}");
        }
        if let Err(e) = self.stream.shutdown(Shutdown::Both) {
            debug!("Rtmp socket shutdown: {e}");
        }
        if let Some(reader) = self.reader.take() {
            if reader.join().is_err() {
                warn!("Thread[rtmp-push-reader] panicked.");
            }
        }
        info!("Rtmp stream {} closed.", self.stream_id);
    }
}

impl Drop for RtmpTransport {
    fn drop(&mut self) {
        self.close();
    }
}

/// Drains whatever the server sends once publishing has started. Nothing
/// after `NetStream.Publish.Start` needs an answer from a publisher.
fn spawn_reader(mut stream: TcpStream) -> Result<JoinHandle<()>, TransportError> {
    let handle = std::thread::Builder::new()
        .name("rtmp-push-reader".to_string())
        .spawn(move || {
            let mut buf = [0u8; READ_BUFFER_SIZE];
            loop {
                match stream.read(&mut buf) {
                    Ok(0) => {
                        debug!("Rtmp server closed the connection.");
                        break;
                    }
                    Ok(n) => trace!("Discarded {n} bytes from rtmp server."),
                    Err(e) => {
                        debug!("Rtmp reader exited: {e}");
                        break;
                    }
                }
            }
        })?;
    Ok(handle)
}

/// Connection state used until publishing starts.
struct ClientSetup {
    stream: TcpStream,
    serializer: ChunkSerializer,
    deserializer: ChunkDeserializer,
    pending: Vec<u8>,
    read_buf: [u8; READ_BUFFER_SIZE],
}

impl ClientSetup {
    fn new(stream: TcpStream) -> Self {
        Self {
            stream,
            serializer: ChunkSerializer::new(),
            deserializer: ChunkDeserializer::new(),
            pending: Vec::new(),
            read_buf: [0u8; READ_BUFFER_SIZE],
        }
    }

    fn handshake(&mut self) -> Result<(), TransportError> {
        let mut handshake = Handshake::new(PeerType::Client);
        let p0_and_p1 = handshake
            .generate_outbound_p0_and_p1()
            .map_err(|e| protocol_error("generate handshake", e))?;
        self.stream.write_all(&p0_and_p1)?;

        loop {
            let n = self.stream.read(&mut self.read_buf)?;
            if n == 0 {
                return Err(TransportError::Disconnected);
            }
            match handshake
                .process_bytes(&self.read_buf[..n])
                .map_err(|e| protocol_error("handshake", e))?
            {
                HandshakeProcessResult::InProgress { response_bytes } => {
                    if !response_bytes.is_empty() {
                        self.stream.write_all(&response_bytes)?;
                    }
                }
                HandshakeProcessResult::Completed {
                    response_bytes,
                    remaining_bytes,
                } => {
                    if !response_bytes.is_empty() {
                        self.stream.write_all(&response_bytes)?;
                    }
                    self.pending = remaining_bytes;
                    debug!("Rtmp handshake completed.");
                    return Ok(());
                }
            }
        }
    }

    fn send_command(
        &mut self,
        command_name: &str,
        transaction_id: f64,
        command_object: Amf0Value,
        additional_arguments: Vec<Amf0Value>,
        stream_id: u32,
    ) -> Result<(), TransportError> {
        let payload = RtmpMessage::Amf0Command {
            command_name: command_name.to_string(),
            transaction_id,
            command_object,
            additional_arguments,
        }
        .into_message_payload(RtmpTimestamp { value: 0 }, stream_id)
        .map_err(|e| protocol_error(&format!("create {command_name} command"), e))?;
        let packet = self
            .serializer
            .serialize(&payload, false, false)
            .map_err(|e| protocol_error(&format!("serialize {command_name} command"), e))?;
        self.stream.write_all(&packet.bytes)?;
        Ok(())
    }

    fn read_message(&mut self) -> Result<RtmpMessage, TransportError> {
        let mut incoming = std::mem::take(&mut self.pending);
        loop {
            let payload = self
                .deserializer
                .get_next_message(&incoming)
                .map_err(|e| protocol_error("read chunk", e))?;
            incoming.clear();

            if let Some(payload) = payload {
                let message = payload
                    .to_rtmp_message()
                    .map_err(|e| protocol_error("decode message", e))?;
                if let RtmpMessage::SetChunkSize { size } = message {
                    self.deserializer
                        .set_max_chunk_size(size as usize)
                        .map_err(|e| protocol_error("set chunk size", e))?;
                    continue;
                }
                return Ok(message);
            }

            let n = self.stream.read(&mut self.read_buf)?;
            if n == 0 {
                return Err(TransportError::Disconnected);
            }
            incoming.extend_from_slice(&self.read_buf[..n]);
        }
    }

    /// Waits for the `_result` of `transaction_id` and returns its arguments.
    fn wait_for_result(
        &mut self,
        command_name: &str,
        transaction_id: f64,
    ) -> Result<Vec<Amf0Value>, TransportError> {
        loop {
            match self.read_message()? {
                RtmpMessage::Amf0Command {
                    command_name: reply,
                    transaction_id: id,
                    additional_arguments,
                    ..
                } if id == transaction_id => match reply.as_str() {
                    "_result" => return Ok(additional_arguments),
                    "_error" => {
                        return Err(TransportError::Protocol(format!(
                            "{command_name} rejected: {additional_arguments:?}"
                        )))
                    }
                    _ => {}
                },
                other => trace!("Ignoring {other:?} while waiting for {command_name}."),
            }
        }
    }

    fn connect(&mut self, url: &RtmpUrl) -> Result<(), TransportError> {
        let mut properties: HashMap<String, Amf0Value> = HashMap::new();
        properties.insert("app".to_string(), Amf0Value::Utf8String(url.app.clone()));
        properties.insert("type".to_string(), Amf0Value::Utf8String("nonprivate".into()));
        properties.insert("tcUrl".to_string(), Amf0Value::Utf8String(url.tc_url()));
        self.send_command(
            "connect",
            TRANSACTION_CONNECT,
            Amf0Value::Object(properties),
            Vec::new(),
            0,
        )?;
        self.wait_for_result("connect", TRANSACTION_CONNECT)?;
        Ok(())
    }

    fn create_stream(&mut self) -> Result<u32, TransportError> {
        self.send_command(
            "createStream",
            TRANSACTION_CREATE_STREAM,
            Amf0Value::Null,
            Vec::new(),
            0,
        )?;
        let arguments = self.wait_for_result("createStream", TRANSACTION_CREATE_STREAM)?;
        match arguments.first() {
            Some(Amf0Value::Number(id)) => Ok(*id as u32),
            other => Err(TransportError::Protocol(format!(
                "createStream returned no stream id: {other:?}"
            ))),
        }
    }

    fn publish(&mut self, stream_key: &str, stream_id: u32) -> Result<(), TransportError> {
        self.send_command(
            "publish",
            TRANSACTION_PUBLISH,
            Amf0Value::Null,
            vec![
                Amf0Value::Utf8String(stream_key.to_string()),
                Amf0Value::Utf8String("live".into()),
            ],
            stream_id,
        )?;

        loop {
            if let RtmpMessage::Amf0Command {
                command_name,
                additional_arguments,
                ..
            } = self.read_message()?
            {
                if command_name != "onStatus" {
                    continue;
                }
                match status_code(&additional_arguments) {
                    Some("NetStream.Publish.Start") => return Ok(()),
                    Some(code) if code.contains("Publish") || code.contains("Failed") => {
                        return Err(TransportError::Protocol(format!("publish rejected: {code}")))
                    }
                    code => debug!("Ignoring onStatus {code:?} while publishing."),
                }
            }
        }
    }
}

fn status_code(arguments: &[Amf0Value]) -> Option<&str> {
    arguments.iter().find_map(|argument| match argument {
        Amf0Value::Object(properties) => match properties.get("code") {
            Some(Amf0Value::Utf8String(code)) => Some(code.as_str()),
            _ => None,
        },
        _ => None,
    })
}

pub fn flv_tag_to_message_payload(flv_tag: FlvTag) -> MessagePayload {
    let timestamp = flv_tag.header.full_timestamp();
    let type_id = flv_tag.header.tag_type;
    let message_stream_id = flv_tag.header.stream_id;

    let data = if type_id == FLV_TAG_TYPE_META {
        wrap_metadata(flv_tag.data)
    } else {
        flv_tag.data
    };

    MessagePayload {
        timestamp: RtmpTimestamp { value: timestamp },
        type_id,
        message_stream_id,
        data,
    }
}

fn wrap_metadata(data: Bytes) -> Bytes {
    let s = "@setDataFrame";
    let mut bytes = bytes::BytesMut::with_capacity(3 + s.len() + data.len());
    bytes.put_u8(0x02);
    bytes.put_u16(s.len() as u16);
    bytes.put(s.as_bytes());
    bytes.put(data);
    bytes.freeze()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::SessionConfig;
    use crate::core::media_packet::{AudioCodec, AudioFormat, MediaPacket};
    use crate::core::session::Session;
    use crate::flv::flv_tag::FlvTagHeader;
    use crate::flv::FLV_TAG_TYPE_AUDIO;

    fn tag(tag_type: u8, timestamp: u32, data: &'static [u8]) -> FlvTag {
        FlvTag {
            header: FlvTagHeader {
                tag_type,
                data_size: data.len() as u32,
                timestamp: timestamp & 0x00FF_FFFF,
                timestamp_ext: (timestamp >> 24) as u8,
                stream_id: 1,
            },
            data: Bytes::from_static(data),
            previous_tag_size: data.len() as u32 + 11,
        }
    }

    #[test]
    fn test_metadata_becomes_set_data_frame() {
        let payload = flv_tag_to_message_payload(tag(FLV_TAG_TYPE_META, 0, b"\x02\x00\x0aonMetaData"));
        assert_eq!(payload.type_id, FLV_TAG_TYPE_META);
        assert_eq!(&payload.data[..3], &[0x02, 0x00, 13]);
        assert_eq!(&payload.data[3..16], b"@setDataFrame");
        assert_eq!(&payload.data[16..19], &[0x02, 0x00, 0x0a]);
    }

    #[test]
    fn test_media_tag_keeps_payload_and_extended_timestamp() {
        let payload = flv_tag_to_message_payload(tag(FLV_TAG_TYPE_AUDIO, 0x0100_0010, b"\xAF\x01\x21"));
        assert_eq!(payload.timestamp.value, 0x0100_0010);
        assert_eq!(payload.message_stream_id, 1);
        assert_eq!(&payload.data[..], b"\xAF\x01\x21");
    }

    #[test]
    fn test_invalid_url_fails_setup() {
        assert!(matches!(
            RtmpTransport::connect("rtmp://localhost"),
            Err(TransportError::InvalidUrl(_))
        ));
    }

    #[test]
    #[ignore]
    fn test_publish_to_local_server() {
        let _ = env_logger::builder()
            .filter_level(log::LevelFilter::Debug)
            .is_test(true)
            .try_init();

        let mut session =
            Session::create("rtmp://localhost:1935/live/ez-rtmp-push", SessionConfig::default())
                .unwrap();
        let format = AudioFormat::new(AudioCodec::G711A, 8000, 1);
        session
            .add_stream(&MediaPacket::audio(Vec::new(), format))
            .unwrap();
        session.start().unwrap();
        for i in 0..50u64 {
            session
                .push(&MediaPacket::audio(vec![0xD5; 160], format).set_pts(i * 20_000))
                .unwrap();
        }
        std::thread::sleep(Duration::from_secs(2));
        assert!(session.is_running());
        session.destroy().unwrap();
    }
}
