//! HTTP/2 stream management
//!
//! One [`H2Stream`] per stream id: the RFC 7540 Section 5.1 state machine,
//! a flow controller, the upward callbacks, and the write-blocked flag. The
//! connection dispatches inbound frames to `handle_*` methods; the
//! application sends through the connection, which routes into `send_*`
//! with a [`SendCtx`] borrowed from the connection's own state.
//!
//! [`StreamTable`] holds the live streams and owns id allocation: client
//! ids odd, server ids even, strictly increasing within each parity class.

use crate::codec::FrameCodec;
use crate::error::{Error, ErrorCode, Result};
use crate::flow_control::FlowController;
use crate::frames::{DataFrame, HeadersFrame, RstStreamFrame, WindowUpdateFrame};
use crate::headers::HeaderList;
use crate::hpack::HpackCodec;
use bytes::{Bytes, BytesMut};
use std::collections::{HashMap, VecDeque};
use tracing::{debug, trace, warn};

/// Stream ID type
pub type StreamId = u32;

/// Stream state as defined in RFC 7540 Section 5.1
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    /// Idle: No frames have been sent/received
    Idle,
    /// Reserved (local): PUSH_PROMISE sent
    ReservedLocal,
    /// Reserved (remote): PUSH_PROMISE received
    ReservedRemote,
    /// Open: Both sides can send frames
    Open,
    /// Half-closed (local): We can't send, they can
    HalfClosedLocal,
    /// Half-closed (remote): They can't send, we can
    HalfClosedRemote,
    /// Closed: Stream is closed
    Closed,
}

impl StreamState {
    /// Check if the stream can send DATA
    pub fn can_send(&self) -> bool {
        matches!(self, StreamState::Open | StreamState::HalfClosedRemote)
    }

    /// Check if the stream can receive DATA
    pub fn can_receive(&self) -> bool {
        matches!(self, StreamState::Open | StreamState::HalfClosedLocal)
    }

    /// Check if the stream is closed
    pub fn is_closed(&self) -> bool {
        matches!(self, StreamState::Closed)
    }
}

/// Headers callback: `(headers, end_headers, end_stream)`.
/// Invoked for the initial header block and again for trailers.
pub type HeadersCallback = Box<dyn FnMut(&HeaderList, bool, bool)>;

/// Data callback: `(bytes, end_stream)`
pub type DataCallback = Box<dyn FnMut(&[u8], bool)>;

/// Reset callback: invoked once with the error code when the stream dies
pub type ResetCallback = Box<dyn FnMut(ErrorCode)>;

/// Write-ready callback: invoked on a blocked-to-unblocked transition with
/// a writer scoped to this stream, so the wake-up can send inline
pub type WriteCallback = Box<dyn FnMut(&mut StreamWriter<'_, '_>)>;

/// Disjoint borrow of the connection state a stream needs to send frames:
/// the outbound buffer, the connection-level window, the blocked list, and
/// the shared HPACK encoder. Never includes the stream table, so stream
/// send paths cannot alias it.
pub struct SendCtx<'a> {
    pub(crate) out: &'a mut BytesMut,
    pub(crate) conn_flow: &'a mut FlowController,
    pub(crate) blocked: &'a mut VecDeque<StreamId>,
    pub(crate) hpack: &'a mut HpackCodec,
    pub(crate) max_frame_size: usize,
}

/// HTTP/2 stream
pub struct H2Stream {
    id: StreamId,
    state: StreamState,
    flow: FlowController,
    write_blocked: bool,
    headers_received: bool,
    reset_notified: bool,
    headers_cb: Option<HeadersCallback>,
    data_cb: Option<DataCallback>,
    reset_cb: Option<ResetCallback>,
    write_cb: Option<WriteCallback>,
}

impl H2Stream {
    /// Create a stream with the given initial window sizes.
    ///
    /// The local window step defaults to the initial local window, so a
    /// WINDOW_UPDATE goes out once the peer has used the whole window.
    pub(crate) fn new(id: StreamId, init_local_window: u32, init_remote_window: u32) -> Self {
        H2Stream {
            id,
            state: StreamState::Idle,
            flow: FlowController::new(init_local_window, init_remote_window),
            write_blocked: false,
            headers_received: false,
            reset_notified: false,
            headers_cb: None,
            data_cb: None,
            reset_cb: None,
            write_cb: None,
        }
    }

    /// Get stream ID
    pub fn id(&self) -> StreamId {
        self.id
    }

    /// Get stream state
    pub fn state(&self) -> StreamState {
        self.state
    }

    /// Whether the last send was cut short by flow control
    pub fn is_write_blocked(&self) -> bool {
        self.write_blocked
    }

    pub(crate) fn flow_mut(&mut self) -> &mut FlowController {
        &mut self.flow
    }

    /// Current remote (send) window
    pub fn remote_window(&self) -> i64 {
        self.flow.remote_window()
    }

    /// Install the headers callback
    pub fn set_headers_callback(&mut self, cb: HeadersCallback) {
        self.headers_cb = Some(cb);
    }

    /// Install the data callback
    pub fn set_data_callback(&mut self, cb: DataCallback) {
        self.data_cb = Some(cb);
    }

    /// Install the reset callback
    pub fn set_reset_callback(&mut self, cb: ResetCallback) {
        self.reset_cb = Some(cb);
    }

    /// Install the write-ready callback
    pub fn set_write_callback(&mut self, cb: WriteCallback) {
        self.write_cb = Some(cb);
    }

    // ---- outbound -------------------------------------------------------

    /// Send a HEADERS frame carrying `headers`.
    ///
    /// The header block always fits one frame (END_HEADERS set); HPACK
    /// output is bounded by the peer's MAX_FRAME_SIZE in practice.
    pub(crate) fn send_headers(
        &mut self,
        ctx: &mut SendCtx<'_>,
        headers: &HeaderList,
        end_stream: bool,
    ) -> Result<()> {
        match self.state {
            StreamState::Idle
            | StreamState::ReservedLocal
            | StreamState::Open
            | StreamState::HalfClosedRemote => {}
            _ => {
                return Err(Error::Protocol(format!(
                    "cannot send HEADERS in state {:?}",
                    self.state
                )));
            }
        }

        let block = ctx.hpack.encode(headers);
        let frame = HeadersFrame::new(self.id, block, end_stream, true);
        FrameCodec::encode_headers_frame(&frame, ctx.out);

        if self.state == StreamState::Idle {
            self.state = StreamState::Open;
        } else if self.state == StreamState::ReservedLocal {
            self.state = StreamState::HalfClosedRemote;
        }
        if end_stream {
            self.end_stream_sent();
        }
        Ok(())
    }

    /// Send body bytes, bounded by the stream and connection windows.
    ///
    /// Returns the byte count actually written, which may be less than
    /// `data.len()` or zero when flow control blocks the stream; callers
    /// retry after the write-ready callback fires. With `end_stream` and no
    /// remaining data, a zero-length END_STREAM frame goes out.
    pub(crate) fn send_data(
        &mut self,
        ctx: &mut SendCtx<'_>,
        data: &[u8],
        end_stream: bool,
    ) -> Result<usize> {
        if self.state == StreamState::HalfClosedLocal || self.state == StreamState::Closed {
            return Err(Error::StreamClosed(self.id));
        }
        if self.write_blocked {
            return Ok(0);
        }

        let stream_window = self.flow.remote_window();
        let conn_window = ctx.conn_flow.remote_window();
        let window = std::cmp::max(0, std::cmp::min(stream_window, conn_window)) as usize;
        if window == 0 && (!end_stream || !data.is_empty()) {
            debug!(
                stream = self.id,
                cws = conn_window,
                sws = stream_window,
                "send_data, remote window empty"
            );
            self.write_blocked = true;
            if conn_window <= 0 {
                ctx.blocked.push_back(self.id);
            }
            return Ok(0);
        }

        let send_len = std::cmp::min(window, data.len());
        let end_stream_now = end_stream && send_len == data.len();

        if send_len == 0 {
            // end_stream with nothing left to send
            let frame = DataFrame::new(self.id, Bytes::new(), true);
            FrameCodec::encode_data_frame(&frame, ctx.out);
        } else {
            let mut off = 0;
            while off < send_len {
                let chunk = std::cmp::min(ctx.max_frame_size, send_len - off);
                let last = off + chunk == send_len;
                let frame = DataFrame::new(
                    self.id,
                    Bytes::copy_from_slice(&data[off..off + chunk]),
                    end_stream_now && last,
                );
                FrameCodec::encode_data_frame(&frame, ctx.out);
                off += chunk;
            }
        }

        self.flow.bytes_sent(send_len);
        ctx.conn_flow.bytes_sent(send_len);
        if end_stream_now {
            self.end_stream_sent();
        }
        if send_len < data.len() {
            self.write_blocked = true;
            if ctx.conn_flow.remote_window() <= 0 {
                ctx.blocked.push_back(self.id);
            }
        }
        Ok(send_len)
    }

    /// Cancel the stream: one RST_STREAM(CANCEL) and a transition to
    /// CLOSED. Idempotent.
    pub(crate) fn close(&mut self, ctx: &mut SendCtx<'_>) {
        if self.state == StreamState::Closed {
            return;
        }
        self.send_rst_stream(ctx, ErrorCode::Cancel);
        self.state = StreamState::Closed;
    }

    fn send_rst_stream(&mut self, ctx: &mut SendCtx<'_>, code: ErrorCode) {
        let frame = RstStreamFrame {
            stream_id: self.id,
            error_code: code,
        };
        FrameCodec::encode_rst_stream_frame(&frame, ctx.out);
    }

    /// Stream-fatal error: RST_STREAM out, CLOSED, reset surfaced upward
    pub(crate) fn stream_error(&mut self, ctx: &mut SendCtx<'_>, code: ErrorCode) {
        warn!(stream = self.id, code = %code, "stream error");
        self.send_rst_stream(ctx, code);
        self.state = StreamState::Closed;
        self.notify_reset(code);
    }

    /// Surface a reset to the application exactly once
    pub(crate) fn notify_reset(&mut self, code: ErrorCode) {
        if self.reset_notified {
            return;
        }
        self.reset_notified = true;
        if let Some(cb) = &mut self.reset_cb {
            cb(code);
        }
    }

    fn end_stream_sent(&mut self) {
        if self.state == StreamState::HalfClosedRemote {
            self.state = StreamState::Closed;
        } else {
            self.state = StreamState::HalfClosedLocal;
        }
    }

    fn end_stream_received(&mut self) {
        if self.state == StreamState::HalfClosedLocal {
            self.state = StreamState::Closed;
        } else {
            self.state = StreamState::HalfClosedRemote;
        }
    }

    // ---- inbound dispatch (called by the connection) --------------------

    pub(crate) fn handle_data(&mut self, ctx: &mut SendCtx<'_>, data: &[u8], end_stream: bool) {
        if matches!(self.state, StreamState::HalfClosedRemote | StreamState::Closed) {
            self.stream_error(ctx, ErrorCode::StreamClosed);
            return;
        }
        if end_stream {
            trace!(stream = self.id, "DATA with END_STREAM");
            self.end_stream_received();
        }
        if let Some(increment) = self.flow.bytes_received(data.len()) {
            // No point returning credit once the peer is done sending
            if !matches!(self.state, StreamState::Closed | StreamState::HalfClosedRemote) {
                let frame = WindowUpdateFrame::new(self.id, increment);
                FrameCodec::encode_window_update_frame(&frame, ctx.out);
            }
        }
        if let Some(cb) = &mut self.data_cb {
            cb(data, end_stream);
        }
    }

    pub(crate) fn handle_headers(
        &mut self,
        ctx: &mut SendCtx<'_>,
        headers: &HeaderList,
        end_headers: bool,
        end_stream: bool,
    ) {
        if matches!(self.state, StreamState::HalfClosedRemote | StreamState::Closed) {
            self.stream_error(ctx, ErrorCode::StreamClosed);
            return;
        }
        let is_trailer = self.headers_received
            && matches!(self.state, StreamState::Open | StreamState::HalfClosedLocal);
        if is_trailer && !end_stream {
            // Trailer blocks must end the stream
            self.stream_error(ctx, ErrorCode::ProtocolError);
            return;
        }
        if !is_trailer {
            self.headers_received = true;
        }

        if self.state == StreamState::ReservedRemote {
            self.state = StreamState::HalfClosedLocal;
        } else if self.state == StreamState::Idle {
            self.state = StreamState::Open;
        }
        if end_stream {
            trace!(stream = self.id, "HEADERS with END_STREAM");
            self.end_stream_received();
        }
        if let Some(cb) = &mut self.headers_cb {
            cb(headers, end_headers, end_stream);
        }
    }

    pub(crate) fn handle_rst_stream(&mut self, code: ErrorCode) {
        debug!(stream = self.id, code = %code, "RST_STREAM received");
        self.state = StreamState::Closed;
        self.notify_reset(code);
    }

    pub(crate) fn handle_window_update(&mut self, ctx: &mut SendCtx<'_>, increment: u32) {
        trace!(
            stream = self.id,
            delta = increment,
            window = self.flow.remote_window(),
            "WINDOW_UPDATE received"
        );
        if increment == 0 {
            self.stream_error(ctx, ErrorCode::ProtocolError);
            return;
        }
        let need_wake = self.flow.remote_window() <= 0;
        if self.flow.update_remote_window(increment).is_err() {
            self.stream_error(ctx, ErrorCode::FlowControlError);
            return;
        }
        if need_wake
            && self.state != StreamState::Idle
            && self.flow.remote_window() > 0
            && self.write_blocked
        {
            self.wake_write(ctx);
        }
    }

    /// PUSH_PROMISE received announcing this stream id
    pub(crate) fn mark_reserved_remote(&mut self) {
        debug_assert_eq!(self.state, StreamState::Idle);
        self.state = StreamState::ReservedRemote;
    }

    /// Deliver the header block carried by a PUSH_PROMISE. No state change:
    /// the stream stays RESERVED_REMOTE until the pushed response HEADERS.
    pub(crate) fn deliver_promise_headers(&mut self, headers: &HeaderList, end_headers: bool) {
        if let Some(cb) = &mut self.headers_cb {
            cb(headers, end_headers, false);
        }
    }

    /// Clear the write-blocked flag and fire the write callback with a
    /// writer that can send inline
    pub(crate) fn wake_write(&mut self, ctx: &mut SendCtx<'_>) {
        self.write_blocked = false;
        if let Some(mut cb) = self.write_cb.take() {
            let mut writer = StreamWriter {
                stream: &mut *self,
                ctx: &mut *ctx,
            };
            cb(&mut writer);
            self.write_cb = Some(cb);
        }
    }
}

impl std::fmt::Debug for H2Stream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("H2Stream")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("write_blocked", &self.write_blocked)
            .finish()
    }
}

/// Send handle passed to write-ready callbacks, scoped to one stream
pub struct StreamWriter<'a, 'b> {
    stream: &'a mut H2Stream,
    ctx: &'a mut SendCtx<'b>,
}

impl StreamWriter<'_, '_> {
    /// Stream id of the woken stream
    pub fn id(&self) -> StreamId {
        self.stream.id
    }

    /// Current stream state
    pub fn state(&self) -> StreamState {
        self.stream.state
    }

    /// Remaining stream-level send window
    pub fn remote_window(&self) -> i64 {
        self.stream.flow.remote_window()
    }

    /// Send body bytes; same contract as the connection's `send_data`
    pub fn send_data(&mut self, data: &[u8], end_stream: bool) -> Result<usize> {
        self.stream.send_data(self.ctx, data, end_stream)
    }

    /// Send a headers block (e.g. trailers) from the wake-up
    pub fn send_headers(&mut self, headers: &HeaderList, end_stream: bool) -> Result<()> {
        self.stream.send_headers(self.ctx, headers, end_stream)
    }
}

/// Stream table for a connection.
///
/// Owns id allocation and the parity/monotonicity invariants; entries are
/// removed by the connection once a stream reaches CLOSED and its terminal
/// callbacks have run.
pub struct StreamTable {
    streams: HashMap<StreamId, H2Stream>,
    is_client: bool,
    next_local_id: StreamId,
    last_peer_id: StreamId,
    /// Our advertised limit, applied to peer-opened streams
    local_max_concurrent: Option<u32>,
    /// Peer's advertised limit, applied to streams we open
    remote_max_concurrent: Option<u32>,
}

impl StreamTable {
    /// Create a table; clients allocate odd ids, servers even
    pub fn new(is_client: bool) -> Self {
        StreamTable {
            streams: HashMap::new(),
            is_client,
            next_local_id: if is_client { 1 } else { 2 },
            last_peer_id: 0,
            local_max_concurrent: None,
            remote_max_concurrent: None,
        }
    }

    /// True when `id` belongs to the locally-initiated parity class
    pub fn is_local(&self, id: StreamId) -> bool {
        (id % 2 == 1) == self.is_client
    }

    /// Highest peer-initiated id seen
    pub fn last_peer_id(&self) -> StreamId {
        self.last_peer_id
    }

    /// True when `id` has never been opened from either side.
    ///
    /// Only meaningful for ids absent from the table: a missing non-idle id
    /// belonged to a stream that has since closed.
    pub fn is_idle(&self, id: StreamId) -> bool {
        if self.is_local(id) {
            id >= self.next_local_id
        } else {
            id > self.last_peer_id
        }
    }

    /// Set our advertised MAX_CONCURRENT_STREAMS
    pub fn set_local_max_concurrent(&mut self, max: Option<u32>) {
        self.local_max_concurrent = max;
    }

    /// Set the peer's advertised MAX_CONCURRENT_STREAMS
    pub fn set_remote_max_concurrent(&mut self, max: Option<u32>) {
        self.remote_max_concurrent = max;
    }

    fn active_count(&self, local: bool) -> usize {
        self.streams
            .values()
            .filter(|s| self.is_local(s.id()) == local && !s.state().is_closed())
            .count()
    }

    /// Allocate the next local stream id and create its stream
    pub fn open_local(&mut self, init_local: u32, init_remote: u32) -> Result<StreamId> {
        if let Some(max) = self.remote_max_concurrent {
            if self.active_count(true) >= max as usize {
                return Err(Error::TooManyStreams);
            }
        }
        let id = self.next_local_id;
        self.next_local_id += 2;
        self.streams
            .insert(id, H2Stream::new(id, init_local, init_remote));
        Ok(id)
    }

    /// Create a stream for a peer-initiated id.
    ///
    /// Fails with `Protocol` on parity or monotonicity violations (both are
    /// connection-fatal) and with `RefusedStream` when our concurrency limit
    /// is exceeded (stream-fatal, RST without table state).
    pub fn create_peer(
        &mut self,
        id: StreamId,
        init_local: u32,
        init_remote: u32,
    ) -> Result<&mut H2Stream> {
        if id == 0 || self.is_local(id) {
            return Err(Error::Protocol(format!(
                "peer opened stream {} with local parity",
                id
            )));
        }
        if id <= self.last_peer_id {
            return Err(Error::Protocol(format!(
                "peer stream id {} not above {}",
                id, self.last_peer_id
            )));
        }
        if let Some(max) = self.local_max_concurrent {
            if self.active_count(false) >= max as usize {
                return Err(Error::RefusedStream(id));
            }
        }
        self.last_peer_id = id;
        let stream = self
            .streams
            .entry(id)
            .or_insert_with(|| H2Stream::new(id, init_local, init_remote));
        Ok(stream)
    }

    /// Get a stream by ID
    pub fn get(&self, id: StreamId) -> Option<&H2Stream> {
        self.streams.get(&id)
    }

    /// Get a mutable stream by ID
    pub fn get_mut(&mut self, id: StreamId) -> Option<&mut H2Stream> {
        self.streams.get_mut(&id)
    }

    /// Remove a stream
    pub fn remove(&mut self, id: StreamId) -> Option<H2Stream> {
        self.streams.remove(&id)
    }

    /// All live stream ids
    pub fn ids(&self) -> Vec<StreamId> {
        self.streams.keys().copied().collect()
    }

    /// Iterate over all live streams mutably
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut H2Stream> {
        self.streams.values_mut()
    }

    /// Number of live streams
    pub fn len(&self) -> usize {
        self.streams.len()
    }

    /// True when no streams are live
    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }
}
