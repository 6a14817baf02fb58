//! HTTP/2 connection multiplexer
//!
//! [`H2Connection`] is the single owner of the frame parser, the stream
//! table, the connection-level flow controller, the HPACK codec, and the
//! outbound write buffer. Inbound bytes flow through `on_bytes` into
//! per-frame dispatch; outbound operations route through a [`SendCtx`]
//! borrowed from the connection so streams never hold a reference back.
//!
//! All entry points must run on the connection's owning loop; the type is
//! deliberately not `Send`-shareable across concurrent callers.

use crate::codec::{FrameCodec, FrameParser, ParseOutcome};
use crate::error::{Error, ErrorCode, Result};
use crate::flow_control::FlowController;
use crate::frames::{
    Frame, FrameHeader, FrameType, GoawayFrame, PingFrame, RstStreamFrame, SettingsFrame,
    WindowUpdateFrame,
};
use crate::headers::{self, HeaderList};
use crate::hpack::HpackCodec;
use crate::settings::Settings;
use crate::stream::{H2Stream, SendCtx, StreamId, StreamTable};
use crate::transport::Transport;
use crate::DEFAULT_INITIAL_WINDOW_SIZE;
use bytes::{Buf, Bytes, BytesMut};
use std::collections::VecDeque;
use std::mem;
use tracing::{debug, trace, warn};

/// Which endpoint of the connection we are
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    /// Client endpoint: opens odd-numbered streams
    Client,
    /// Server endpoint: opens even-numbered streams
    Server,
}

/// Callback surfacing a peer-opened stream before its opening header block
/// is dispatched, so stream callbacks can be installed in time
pub type NewStreamCallback = Box<dyn FnMut(StreamId, &mut H2Stream)>;

/// One header block being coalesced across HEADERS/PUSH_PROMISE and
/// CONTINUATION frames
struct PendingHeaderBlock {
    stream_id: StreamId,
    /// Set when the block came from PUSH_PROMISE: headers belong to the
    /// promised stream, not the carrying stream
    promised_id: Option<StreamId>,
    fragments: BytesMut,
    end_stream: bool,
}

/// HTTP/2 connection multiplexer
pub struct H2Connection<T: Transport> {
    io: T,
    side: Side,
    parser: FrameParser,
    hpack: HpackCodec,
    local_settings: Settings,
    peer_settings: Settings,
    /// Connection-level flow controller (stream 0 scope)
    flow: FlowController,
    streams: StreamTable,
    /// Streams whose sends stalled on the connection window, in FIFO order
    blocked: VecDeque<StreamId>,
    /// Outbound bytes not yet accepted by the transport
    wbuf: BytesMut,
    /// Peer's first frame must be SETTINGS
    expect_settings: bool,
    settings_acked: bool,
    pending_block: Option<PendingHeaderBlock>,
    local_goaway: bool,
    remote_goaway: Option<StreamId>,
    conn_error: Option<ErrorCode>,
    closed: bool,
    new_stream_cb: Option<NewStreamCallback>,
}

impl<T: Transport> H2Connection<T> {
    /// Create a connection over `io` and send the initial SETTINGS frame.
    ///
    /// The transport delivers post-preface plaintext; preface exchange (and
    /// ALPN before it) happens in the collaborator.
    pub fn new(io: T, side: Side, local_settings: Settings) -> Result<Self> {
        local_settings.validate()?;
        let mut hpack = HpackCodec::new();
        hpack.set_decoder_max_table_size(local_settings.get_header_table_size() as usize);
        let mut streams = StreamTable::new(side == Side::Client);
        streams.set_local_max_concurrent(local_settings.get_max_concurrent_streams());

        let mut conn = H2Connection {
            io,
            side,
            parser: FrameParser::new(local_settings.get_max_frame_size()),
            hpack,
            peer_settings: Settings::default_settings(),
            local_settings,
            flow: FlowController::new(DEFAULT_INITIAL_WINDOW_SIZE, DEFAULT_INITIAL_WINDOW_SIZE),
            streams,
            blocked: VecDeque::new(),
            wbuf: BytesMut::new(),
            expect_settings: true,
            settings_acked: false,
            pending_block: None,
            local_goaway: false,
            remote_goaway: None,
            conn_error: None,
            closed: false,
            new_stream_cb: None,
        };

        let frame = SettingsFrame::new(conn.local_settings.clone());
        FrameCodec::encode_settings_frame(&frame, &mut conn.wbuf);
        conn.try_flush()?;
        Ok(conn)
    }

    /// Which endpoint this connection is
    pub fn side(&self) -> Side {
        self.side
    }

    /// Our settings as sent to the peer
    pub fn local_settings(&self) -> &Settings {
        &self.local_settings
    }

    /// The peer's settings as last received
    pub fn peer_settings(&self) -> &Settings {
        &self.peer_settings
    }

    /// Whether the peer acknowledged our SETTINGS
    pub fn settings_acked(&self) -> bool {
        self.settings_acked
    }

    /// Remaining connection-level send window
    pub fn remote_window(&self) -> i64 {
        self.flow.remote_window()
    }

    /// Highest peer-initiated stream id seen
    pub fn last_peer_stream_id(&self) -> StreamId {
        self.streams.last_peer_id()
    }

    /// Whether the connection has been torn down
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Access the transport collaborator
    pub fn transport(&self) -> &T {
        &self.io
    }

    /// Mutable access to the transport collaborator
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.io
    }

    /// Look up a live stream
    pub fn stream(&self, id: StreamId) -> Option<&H2Stream> {
        self.streams.get(id)
    }

    /// Look up a live stream mutably (for callback installation)
    pub fn stream_mut(&mut self, id: StreamId) -> Option<&mut H2Stream> {
        self.streams.get_mut(id)
    }

    /// Install the hook invoked when the peer opens a new stream
    pub fn set_new_stream_callback(&mut self, cb: NewStreamCallback) {
        self.new_stream_cb = Some(cb);
    }

    // ---- application entry points ---------------------------------------

    /// Open a locally-initiated stream and return its id
    pub fn open_stream(&mut self) -> Result<StreamId> {
        if self.closed || self.conn_error.is_some() {
            return Err(Error::ConnectionClosed);
        }
        if self.local_goaway || self.remote_goaway.is_some() {
            return Err(Error::GoingAway);
        }
        self.streams.open_local(
            self.local_settings.get_initial_window_size(),
            self.peer_settings.get_initial_window_size(),
        )
    }

    /// Send a header block on `id`
    pub fn send_headers(
        &mut self,
        id: StreamId,
        headers: &HeaderList,
        end_stream: bool,
    ) -> Result<()> {
        let Self {
            wbuf,
            flow,
            blocked,
            hpack,
            peer_settings,
            streams,
            ..
        } = self;
        let mut ctx = SendCtx {
            out: wbuf,
            conn_flow: flow,
            blocked,
            hpack,
            max_frame_size: peer_settings.get_max_frame_size() as usize,
        };
        let Some(stream) = streams.get_mut(id) else {
            return Err(Error::StreamNotFound(id));
        };
        stream.send_headers(&mut ctx, headers, end_stream)?;
        self.finish_dispatch(id);
        self.try_flush()
    }

    /// Send body bytes on `id`.
    ///
    /// Returns the count actually written; zero means flow control blocked
    /// the stream and the write callback will fire when it unblocks.
    pub fn send_data(&mut self, id: StreamId, data: &[u8], end_stream: bool) -> Result<usize> {
        let Self {
            wbuf,
            flow,
            blocked,
            hpack,
            peer_settings,
            streams,
            ..
        } = self;
        let mut ctx = SendCtx {
            out: wbuf,
            conn_flow: flow,
            blocked,
            hpack,
            max_frame_size: peer_settings.get_max_frame_size() as usize,
        };
        let Some(stream) = streams.get_mut(id) else {
            return Err(Error::StreamNotFound(id));
        };
        let sent = stream.send_data(&mut ctx, data, end_stream)?;
        self.finish_dispatch(id);
        self.try_flush()?;
        Ok(sent)
    }

    /// Cancel a stream: RST_STREAM(CANCEL) and removal. Idempotent.
    pub fn close_stream(&mut self, id: StreamId) -> Result<()> {
        let Self {
            wbuf,
            flow,
            blocked,
            hpack,
            peer_settings,
            streams,
            ..
        } = self;
        if let Some(stream) = streams.get_mut(id) {
            let mut ctx = SendCtx {
                out: wbuf,
                conn_flow: flow,
                blocked,
                hpack,
                max_frame_size: peer_settings.get_max_frame_size() as usize,
            };
            stream.close(&mut ctx);
        }
        self.streams.remove(id);
        self.try_flush()
    }

    /// Begin voluntary shutdown.
    ///
    /// Emits GOAWAY with the highest peer stream id accepted; with an error
    /// code other than NO_ERROR the transport is closed after the flush and
    /// all live streams see a reset.
    pub fn goaway(&mut self, code: ErrorCode) -> Result<()> {
        debug!(code = %code, "sending GOAWAY");
        let frame = GoawayFrame::new(self.streams.last_peer_id(), code, Bytes::new());
        FrameCodec::encode_goaway_frame(&frame, &mut self.wbuf);
        self.local_goaway = true;
        self.try_flush()?;
        if code != ErrorCode::NoError {
            self.conn_error = Some(code);
            self.io.close();
            self.closed = true;
            self.fail_all_streams(code);
        }
        Ok(())
    }

    /// Transport produced inbound bytes
    pub fn on_bytes(&mut self, data: &[u8]) -> Result<()> {
        if self.closed || self.conn_error.is_some() {
            return Err(Error::ConnectionClosed);
        }
        let mut parser = mem::take(&mut self.parser);
        let outcome = parser.parse_input(data, &mut |hdr, payload| self.handle_frame(hdr, payload));
        self.parser = parser;
        match outcome {
            ParseOutcome::Success | ParseOutcome::Incomplete => self.try_flush(),
            ParseOutcome::Fatal(err) => self.connection_error(err),
        }
    }

    /// Transport drained; push out buffered bytes
    pub fn on_write_ready(&mut self) -> Result<()> {
        self.try_flush()
    }

    /// Transport closed underneath us: every live stream sees CANCEL once
    pub fn on_closed(&mut self) {
        if self.closed {
            return;
        }
        debug!("transport closed, cancelling live streams");
        self.closed = true;
        self.fail_all_streams(ErrorCode::Cancel);
    }

    // ---- internals ------------------------------------------------------

    fn try_flush(&mut self) -> Result<()> {
        while !self.wbuf.is_empty() {
            let outcome = self.io.write(&self.wbuf)?;
            self.wbuf.advance(outcome.written);
            if outcome.would_block || outcome.written == 0 {
                trace!(pending = self.wbuf.len(), "transport backpressure");
                break;
            }
        }
        Ok(())
    }

    /// Connection-fatal error: GOAWAY out, transport closed, every live
    /// stream reset
    fn connection_error(&mut self, err: Error) -> Result<()> {
        let code = err.h2_code();
        warn!(code = %code, "connection error: {}", err);
        let frame = GoawayFrame::new(self.streams.last_peer_id(), code, Bytes::new());
        FrameCodec::encode_goaway_frame(&frame, &mut self.wbuf);
        self.conn_error = Some(code);
        let _ = self.try_flush();
        self.io.close();
        self.closed = true;
        self.fail_all_streams(code);
        Err(err)
    }

    fn fail_all_streams(&mut self, code: ErrorCode) {
        for id in self.streams.ids() {
            if let Some(mut stream) = self.streams.remove(id) {
                stream.notify_reset(code);
            }
        }
        self.blocked.clear();
    }

    /// Remove a stream once it reached CLOSED and its callbacks have run
    fn finish_dispatch(&mut self, id: StreamId) {
        if let Some(stream) = self.streams.get(id) {
            if stream.state().is_closed() {
                trace!(stream = id, "stream closed, reaping");
                self.streams.remove(id);
            }
        }
    }

    fn handle_frame(&mut self, hdr: &FrameHeader, payload: &[u8]) -> Result<()> {
        trace!(
            frame_type = hdr.frame_type,
            stream = hdr.stream_id,
            len = hdr.length,
            "frame received"
        );

        // A started header block admits nothing but its own CONTINUATIONs
        if let Some(pending) = &self.pending_block {
            let is_continuation = hdr.known_type() == Some(FrameType::Continuation);
            if !is_continuation || hdr.stream_id != pending.stream_id {
                return Err(Error::Protocol(format!(
                    "header block on stream {} interrupted by frame type {:#x} on stream {}",
                    pending.stream_id, hdr.frame_type, hdr.stream_id
                )));
            }
        }

        if self.expect_settings && hdr.known_type() != Some(FrameType::Settings) {
            return Err(Error::Protocol(
                "first frame from peer must be SETTINGS".to_string(),
            ));
        }

        let Some(frame) = Frame::decode(hdr, payload)? else {
            debug!(frame_type = hdr.frame_type, "ignoring unknown frame type");
            return Ok(());
        };

        match frame {
            Frame::Settings(f) => self.handle_settings(f),
            Frame::Ping(f) => self.handle_ping(f),
            Frame::Goaway(f) => self.handle_goaway(f),
            Frame::WindowUpdate(f) if f.stream_id == 0 => self.handle_conn_window_update(f),
            Frame::WindowUpdate(f) => self.handle_stream_window_update(f),
            Frame::Data(f) => self.handle_data(f),
            Frame::Headers(f) => self.handle_headers(f),
            Frame::Continuation(f) => self.handle_continuation(f),
            Frame::PushPromise(f) => self.handle_push_promise(f),
            Frame::RstStream(f) => self.handle_rst_stream(f),
            Frame::Priority(f) => {
                trace!(stream = f.stream_id, "PRIORITY ignored");
                Ok(())
            }
        }
    }

    fn handle_settings(&mut self, frame: SettingsFrame) -> Result<()> {
        self.expect_settings = false;
        if frame.ack {
            trace!("SETTINGS ACK received");
            self.settings_acked = true;
            return Ok(());
        }

        // An INITIAL_WINDOW_SIZE change retro-applies to every stream's
        // send window; the connection window is not affected.
        if let Some(new_size) = frame.settings.initial_window_size {
            let old = self.peer_settings.get_initial_window_size();
            if new_size != old {
                debug!(old, new = new_size, "peer INITIAL_WINDOW_SIZE changed");
                for stream in self.streams.iter_mut() {
                    stream.flow_mut().update_initial_remote_window(new_size)?;
                }
            }
        }

        self.peer_settings.merge(&frame.settings);
        self.streams
            .set_remote_max_concurrent(self.peer_settings.get_max_concurrent_streams());

        FrameCodec::encode_settings_frame(&SettingsFrame::ack(), &mut self.wbuf);
        Ok(())
    }

    fn handle_ping(&mut self, frame: PingFrame) -> Result<()> {
        if !frame.ack {
            trace!("PING received, acking");
            FrameCodec::encode_ping_frame(&PingFrame::ack(frame.data), &mut self.wbuf);
        }
        Ok(())
    }

    fn handle_goaway(&mut self, frame: GoawayFrame) -> Result<()> {
        debug!(
            last_stream = frame.last_stream_id,
            code = %frame.error_code,
            debug_data = %String::from_utf8_lossy(&frame.debug_data),
            "GOAWAY received"
        );
        self.remote_goaway = Some(frame.last_stream_id);

        // Streams we opened above the peer's last-accepted id were never
        // processed; the application may retry them elsewhere.
        let surrendered: Vec<StreamId> = self
            .streams
            .ids()
            .into_iter()
            .filter(|&id| self.streams.is_local(id) && id > frame.last_stream_id)
            .collect();
        for id in surrendered {
            if let Some(mut stream) = self.streams.remove(id) {
                stream.notify_reset(ErrorCode::RefusedStream);
            }
        }
        Ok(())
    }

    fn handle_conn_window_update(&mut self, frame: WindowUpdateFrame) -> Result<()> {
        if frame.size_increment == 0 {
            return Err(Error::Protocol(
                "zero-delta WINDOW_UPDATE on connection".to_string(),
            ));
        }
        let was = self.flow.remote_window();
        self.flow.update_remote_window(frame.size_increment)?;
        trace!(
            delta = frame.size_increment,
            window = self.flow.remote_window(),
            "connection WINDOW_UPDATE"
        );
        if was <= 0 && self.flow.remote_window() > 0 {
            self.drain_blocked();
        }
        Ok(())
    }

    /// Wake write-blocked streams in FIFO order until the connection window
    /// runs dry again; streams still blocked re-append themselves.
    fn drain_blocked(&mut self) {
        loop {
            if self.flow.remote_window() <= 0 {
                break;
            }
            let Some(id) = self.blocked.pop_front() else {
                break;
            };
            trace!(stream = id, "connection window replenished, waking");
            let Self {
                wbuf,
                flow,
                blocked,
                hpack,
                peer_settings,
                streams,
                ..
            } = self;
            let mut ctx = SendCtx {
                out: wbuf,
                conn_flow: flow,
                blocked,
                hpack,
                max_frame_size: peer_settings.get_max_frame_size() as usize,
            };
            let closed = if let Some(stream) = streams.get_mut(id) {
                stream.wake_write(&mut ctx);
                stream.state().is_closed()
            } else {
                false
            };
            if closed {
                streams.remove(id);
            }
        }
    }

    fn handle_stream_window_update(&mut self, frame: WindowUpdateFrame) -> Result<()> {
        let Self {
            wbuf,
            flow,
            blocked,
            hpack,
            peer_settings,
            streams,
            ..
        } = self;
        if let Some(stream) = streams.get_mut(frame.stream_id) {
            let mut ctx = SendCtx {
                out: wbuf,
                conn_flow: flow,
                blocked,
                hpack,
                max_frame_size: peer_settings.get_max_frame_size() as usize,
            };
            stream.handle_window_update(&mut ctx, frame.size_increment);
        } else if streams.is_idle(frame.stream_id) {
            return Err(Error::Protocol(format!(
                "WINDOW_UPDATE on idle stream {}",
                frame.stream_id
            )));
        }
        self.finish_dispatch(frame.stream_id);
        Ok(())
    }

    fn handle_data(&mut self, frame: crate::frames::DataFrame) -> Result<()> {
        // The connection window pays for every DATA byte, whatever the
        // stream's fate.
        if let Some(increment) = self.flow.bytes_received(frame.data.len()) {
            let wu = WindowUpdateFrame::new(0, increment);
            FrameCodec::encode_window_update_frame(&wu, &mut self.wbuf);
        }

        let Self {
            wbuf,
            flow,
            blocked,
            hpack,
            peer_settings,
            streams,
            ..
        } = self;
        let mut ctx = SendCtx {
            out: wbuf,
            conn_flow: flow,
            blocked,
            hpack,
            max_frame_size: peer_settings.get_max_frame_size() as usize,
        };
        if let Some(stream) = streams.get_mut(frame.stream_id) {
            stream.handle_data(&mut ctx, &frame.data, frame.end_stream);
        } else if streams.is_idle(frame.stream_id) {
            return Err(Error::Protocol(format!(
                "DATA on idle stream {}",
                frame.stream_id
            )));
        } else {
            // Stream already reaped: stream-level STREAM_CLOSED
            let rst = RstStreamFrame {
                stream_id: frame.stream_id,
                error_code: ErrorCode::StreamClosed,
            };
            FrameCodec::encode_rst_stream_frame(&rst, ctx.out);
        }
        self.finish_dispatch(frame.stream_id);
        Ok(())
    }

    fn handle_headers(&mut self, frame: crate::frames::HeadersFrame) -> Result<()> {
        if !frame.end_headers {
            self.pending_block = Some(PendingHeaderBlock {
                stream_id: frame.stream_id,
                promised_id: None,
                fragments: BytesMut::from(&frame.header_block[..]),
                end_stream: frame.end_stream,
            });
            return Ok(());
        }
        // Decode unconditionally: HPACK state must advance even for blocks
        // on streams we end up refusing.
        let header_list = self.hpack.decode(&frame.header_block)?;
        self.dispatch_headers(frame.stream_id, header_list, frame.end_stream)
    }

    fn handle_continuation(&mut self, frame: crate::frames::ContinuationFrame) -> Result<()> {
        let Some(mut pending) = self.pending_block.take() else {
            return Err(Error::Protocol(format!(
                "CONTINUATION on stream {} without an open header block",
                frame.stream_id
            )));
        };
        pending.fragments.extend_from_slice(&frame.header_block);
        if !frame.end_headers {
            self.pending_block = Some(pending);
            return Ok(());
        }
        let header_list = self.hpack.decode(&pending.fragments)?;
        match pending.promised_id {
            Some(promised) => self.dispatch_promise_headers(promised, header_list),
            None => self.dispatch_headers(pending.stream_id, header_list, pending.end_stream),
        }
    }

    /// Route a complete, decoded header block to its stream, creating the
    /// stream when the peer is opening one.
    fn dispatch_headers(
        &mut self,
        stream_id: StreamId,
        header_list: HeaderList,
        end_stream: bool,
    ) -> Result<()> {
        let order_ok = headers::validate_pseudo_order(&header_list).is_ok();
        let Self {
            wbuf,
            flow,
            blocked,
            hpack,
            peer_settings,
            local_settings,
            streams,
            new_stream_cb,
            ..
        } = self;
        let mut ctx = SendCtx {
            out: wbuf,
            conn_flow: flow,
            blocked,
            hpack,
            max_frame_size: peer_settings.get_max_frame_size() as usize,
        };

        if streams.get(stream_id).is_none() {
            if streams.is_local(stream_id) {
                if streams.is_idle(stream_id) {
                    return Err(Error::Protocol(format!(
                        "HEADERS on idle local stream {}",
                        stream_id
                    )));
                }
                // Our stream, already reaped
                let rst = RstStreamFrame {
                    stream_id,
                    error_code: ErrorCode::StreamClosed,
                };
                FrameCodec::encode_rst_stream_frame(&rst, ctx.out);
                return Ok(());
            }
            if stream_id <= streams.last_peer_id() {
                // Peer stream ids must strictly increase
                return Err(Error::Protocol(format!(
                    "HEADERS reopening stream {}",
                    stream_id
                )));
            }
            match streams.create_peer(
                stream_id,
                local_settings.get_initial_window_size(),
                peer_settings.get_initial_window_size(),
            ) {
                Ok(stream) => {
                    debug!(stream = stream_id, "peer opened stream");
                    if let Some(cb) = new_stream_cb {
                        cb(stream_id, stream);
                    }
                }
                Err(Error::RefusedStream(id)) => {
                    warn!(stream = id, "refusing stream, concurrency limit reached");
                    let rst = RstStreamFrame {
                        stream_id: id,
                        error_code: ErrorCode::RefusedStream,
                    };
                    FrameCodec::encode_rst_stream_frame(&rst, ctx.out);
                    return Ok(());
                }
                Err(err) => return Err(err),
            }
        }

        let Some(stream) = streams.get_mut(stream_id) else {
            return Ok(());
        };
        if order_ok {
            stream.handle_headers(&mut ctx, &header_list, true, end_stream);
        } else {
            // Malformed block: pseudo-header after a regular header
            stream.stream_error(&mut ctx, ErrorCode::ProtocolError);
        }
        self.finish_dispatch(stream_id);
        Ok(())
    }

    fn handle_push_promise(&mut self, frame: crate::frames::PushPromiseFrame) -> Result<()> {
        if self.side == Side::Server {
            return Err(Error::Protocol(
                "PUSH_PROMISE received by server".to_string(),
            ));
        }
        if !self.local_settings.get_enable_push() {
            return Err(Error::Protocol(
                "PUSH_PROMISE received with push disabled".to_string(),
            ));
        }
        if self.streams.get(frame.stream_id).is_none() || !self.streams.is_local(frame.stream_id) {
            return Err(Error::Protocol(format!(
                "PUSH_PROMISE on unknown stream {}",
                frame.stream_id
            )));
        }

        let init_local = self.local_settings.get_initial_window_size();
        let init_remote = self.peer_settings.get_initial_window_size();
        let Self {
            wbuf,
            streams,
            new_stream_cb,
            ..
        } = self;
        match streams.create_peer(frame.promised_stream_id, init_local, init_remote) {
            Ok(promised) => {
                debug!(
                    stream = frame.stream_id,
                    promised = frame.promised_stream_id,
                    "PUSH_PROMISE received"
                );
                promised.mark_reserved_remote();
                if let Some(cb) = new_stream_cb {
                    cb(frame.promised_stream_id, promised);
                }
            }
            Err(Error::RefusedStream(id)) => {
                warn!(stream = id, "refusing promised stream");
                let rst = RstStreamFrame {
                    stream_id: id,
                    error_code: ErrorCode::RefusedStream,
                };
                FrameCodec::encode_rst_stream_frame(&rst, wbuf);
            }
            Err(err) => return Err(err),
        }

        if frame.end_headers {
            let header_list = self.hpack.decode(&frame.header_block)?;
            self.dispatch_promise_headers(frame.promised_stream_id, header_list)
        } else {
            self.pending_block = Some(PendingHeaderBlock {
                stream_id: frame.stream_id,
                promised_id: Some(frame.promised_stream_id),
                fragments: BytesMut::from(&frame.header_block[..]),
                end_stream: false,
            });
            Ok(())
        }
    }

    fn dispatch_promise_headers(
        &mut self,
        promised_id: StreamId,
        header_list: HeaderList,
    ) -> Result<()> {
        let order_ok = headers::validate_pseudo_order(&header_list).is_ok();
        let Self {
            wbuf,
            flow,
            blocked,
            hpack,
            peer_settings,
            streams,
            ..
        } = self;
        if let Some(stream) = streams.get_mut(promised_id) {
            if order_ok {
                stream.deliver_promise_headers(&header_list, true);
            } else {
                let mut ctx = SendCtx {
                    out: wbuf,
                    conn_flow: flow,
                    blocked,
                    hpack,
                    max_frame_size: peer_settings.get_max_frame_size() as usize,
                };
                stream.stream_error(&mut ctx, ErrorCode::ProtocolError);
            }
        }
        self.finish_dispatch(promised_id);
        Ok(())
    }

    fn handle_rst_stream(&mut self, frame: RstStreamFrame) -> Result<()> {
        if let Some(mut stream) = self.streams.remove(frame.stream_id) {
            stream.handle_rst_stream(frame.error_code);
            Ok(())
        } else if self.streams.is_idle(frame.stream_id) {
            Err(Error::Protocol(format!(
                "RST_STREAM on idle stream {}",
                frame.stream_id
            )))
        } else {
            // Already closed and reaped: ignore
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::SettingsBuilder;
    use crate::transport::BufferTransport;

    fn client_settings() -> Settings {
        SettingsBuilder::new()
            .header_table_size(4096)
            .enable_push(false)
            .initial_window_size(65535)
            .max_frame_size(16384)
            .build()
            .unwrap()
    }

    fn new_client() -> H2Connection<BufferTransport> {
        H2Connection::new(BufferTransport::new(), Side::Client, client_settings()).unwrap()
    }

    #[test]
    fn test_initial_settings_sent() {
        let mut conn = new_client();
        let written = conn.transport_mut().take_written();
        assert_eq!(written[3], FrameType::Settings.as_u8());
        assert_eq!(&written[5..9], &[0, 0, 0, 0]);
        // 4 parameters * 6 bytes
        let len = ((written[0] as usize) << 16) | ((written[1] as usize) << 8) | written[2] as usize;
        assert_eq!(len, 24);
    }

    #[test]
    fn test_first_frame_must_be_settings() {
        let mut conn = new_client();
        conn.transport_mut().take_written();

        let mut buf = BytesMut::new();
        FrameCodec::encode_ping_frame(&PingFrame::new([0; 8]), &mut buf);
        let err = conn.on_bytes(&buf).unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
        assert!(conn.is_closed());
    }

    #[test]
    fn test_settings_acked() {
        let mut conn = new_client();
        conn.transport_mut().take_written();

        let mut buf = BytesMut::new();
        FrameCodec::encode_settings_frame(&SettingsFrame::new(Settings::default_settings()), &mut buf);
        conn.on_bytes(&buf).unwrap();

        let written = conn.transport_mut().take_written();
        // We answered with SETTINGS ACK
        assert_eq!(written[3], FrameType::Settings.as_u8());
        assert_eq!(written[4], crate::frames::FrameFlags::ACK);
    }

    #[test]
    fn test_ping_auto_ack() {
        let mut conn = new_client();
        conn.transport_mut().take_written();

        let mut buf = BytesMut::new();
        FrameCodec::encode_settings_frame(&SettingsFrame::new(Settings::new()), &mut buf);
        FrameCodec::encode_ping_frame(&PingFrame::new([1, 2, 3, 4, 5, 6, 7, 8]), &mut buf);
        conn.on_bytes(&buf).unwrap();

        let written = conn.transport_mut().take_written();
        // SETTINGS ACK (9 bytes) then PING ACK
        let ping = &written[9..];
        assert_eq!(ping[3], FrameType::Ping.as_u8());
        assert_eq!(ping[4], crate::frames::FrameFlags::ACK);
        assert_eq!(&ping[9..17], &[1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn test_open_stream_ids() {
        let mut conn = new_client();
        assert_eq!(conn.open_stream().unwrap(), 1);
        assert_eq!(conn.open_stream().unwrap(), 3);
    }

    #[test]
    fn test_open_stream_after_goaway_refused() {
        let mut conn = new_client();
        conn.goaway(ErrorCode::NoError).unwrap();
        assert!(matches!(conn.open_stream(), Err(Error::GoingAway)));
    }

    #[test]
    fn test_goaway_with_error_closes_transport() {
        let mut conn = new_client();
        conn.goaway(ErrorCode::ProtocolError).unwrap();
        assert!(conn.is_closed());
        assert!(conn.transport().is_closed());
    }

    #[test]
    fn test_on_closed_cancels_streams_once() {
        let mut conn = new_client();
        let id = conn.open_stream().unwrap();
        let resets = std::rc::Rc::new(std::cell::Cell::new(0));
        let counter = resets.clone();
        conn.stream_mut(id)
            .unwrap()
            .set_reset_callback(Box::new(move |code| {
                assert_eq!(code, ErrorCode::Cancel);
                counter.set(counter.get() + 1);
            }));

        conn.on_closed();
        conn.on_closed();
        assert_eq!(resets.get(), 1);
        assert!(conn.stream(id).is_none());
    }
}
