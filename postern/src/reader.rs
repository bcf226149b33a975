//! Inbound message framing.
use crate::{common::verbose, postgres::ProtocolError};

/// Size of the fixed receive buffer.
const BUF_SIZE: usize = 16384;

/// Identifier byte plus the four length bytes.
const HEADER_SIZE: usize = 5;

/// Reassembles length-prefixed messages from arbitrary transport chunks.
///
/// Every complete message occupies one contiguous buffer: the fixed
/// `in_buf`, or a `spill` allocation sized exactly for a message that
/// exceeds it. The spill buffer lives only for the one message it holds
/// and is freed when that message is released.
///
/// `msg_length` doubles as the parse state: while it equals
/// [`HEADER_SIZE`], the header of the next message is still being
/// received; afterwards it is the full on-wire length of the message,
/// identifier byte included.
pub(crate) struct FrameReader {
    in_buf: Box<[u8]>,
    spill: Option<Box<[u8]>>,
    /// Offset of the current message in the active buffer.
    curr_msg: usize,
    msg_length: usize,
    /// Bytes available starting at `curr_msg`.
    received: usize,
    /// A frame is on loan to the dispatcher, released on the next poll.
    dispatched: bool,
}

impl FrameReader {
    pub(crate) fn new() -> FrameReader {
        FrameReader {
            in_buf: vec![0; BUF_SIZE].into_boxed_slice(),
            spill: None,
            curr_msg: 0,
            msg_length: HEADER_SIZE,
            received: 0,
            dispatched: false,
        }
    }

    /// The region for the transport to write into.
    ///
    /// This is the unfilled tail of the active buffer, so a message always
    /// lands contiguous in exactly one of them.
    pub(crate) fn get_buffer(&mut self) -> &mut [u8] {
        let filled = self.curr_msg + self.received;
        match &mut self.spill {
            Some(spill) => &mut spill[filled..],
            None => &mut self.in_buf[filled..],
        }
    }

    /// Account `n` bytes written into the last [`get_buffer`][FrameReader::get_buffer] region.
    pub(crate) fn fill(&mut self, n: usize) {
        self.received += n;
        debug_assert!(self.curr_msg + self.received <= self.active().len());
    }

    /// Next complete message, as `(identifier, body)`.
    ///
    /// The returned body borrows the active buffer; the frame is released
    /// on the following call. `Ok(None)` means more bytes are needed.
    pub(crate) fn next_frame(&mut self) -> Result<Option<(u8, &[u8])>, ProtocolError> {
        self.release();

        loop {
            if self.received < self.msg_length {
                return Ok(None);
            }

            if self.msg_length == HEADER_SIZE {
                let header = &self.active()[self.curr_msg..];
                let length = i32::from_be_bytes([header[1], header[2], header[3], header[4]]);

                // the length field includes itself but not the identifier byte
                if length < 4 {
                    return Err(ProtocolError::InvalidMessageLength { length });
                }
                self.msg_length = length as usize + 1;

                if self.msg_length > BUF_SIZE {
                    verbose!("spilling message of {} bytes", self.msg_length);
                    let mut spill = vec![0; self.msg_length].into_boxed_slice();
                    spill[..self.received]
                        .copy_from_slice(&self.in_buf[self.curr_msg..self.curr_msg + self.received]);
                    self.spill = Some(spill);
                    self.curr_msg = 0;
                }
                continue;
            }

            self.dispatched = true;
            let msg = &self.active()[self.curr_msg..self.curr_msg + self.msg_length];
            return Ok(Some((msg[0], &msg[HEADER_SIZE..])));
        }
    }

    /// Move a partial tail back to the start of the fixed buffer.
    ///
    /// Called after a drain, so the next message header continues at
    /// offset zero and [`get_buffer`][FrameReader::get_buffer] exposes the
    /// whole remaining capacity.
    pub(crate) fn compact(&mut self) {
        if self.spill.is_some() || self.curr_msg == 0 {
            return;
        }
        if self.received > 0 {
            self.in_buf
                .copy_within(self.curr_msg..self.curr_msg + self.received, 0);
        }
        self.curr_msg = 0;
    }

    #[cfg(test)]
    pub(crate) fn spilled(&self) -> bool {
        self.spill.is_some()
    }

    fn active(&self) -> &[u8] {
        match &self.spill {
            Some(spill) => spill,
            None => &self.in_buf,
        }
    }

    fn release(&mut self) {
        if !self.dispatched {
            return;
        }
        self.dispatched = false;
        if self.spill.take().is_some() {
            self.curr_msg = 0;
            self.received = 0;
        } else {
            self.curr_msg += self.msg_length;
            self.received -= self.msg_length;
        }
        self.msg_length = HEADER_SIZE;
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn msg(id: u8, body: &[u8]) -> Vec<u8> {
        let mut buf = vec![id];
        buf.extend_from_slice(&(body.len() as i32 + 4).to_be_bytes());
        buf.extend_from_slice(body);
        buf
    }

    /// Feed `data` in chunks of at most `chunk` bytes, collecting every
    /// dispatched frame as owned `(identifier, body)`.
    fn drive(reader: &mut FrameReader, mut data: &[u8], chunk: usize) -> Vec<(u8, Vec<u8>)> {
        let mut frames = vec![];
        while !data.is_empty() {
            let buf = reader.get_buffer();
            let n = chunk.min(buf.len()).min(data.len());
            buf[..n].copy_from_slice(&data[..n]);
            data = &data[n..];
            reader.fill(n);
            while let Some((id, body)) = reader.next_frame().unwrap() {
                frames.push((id, body.to_vec()));
            }
            reader.compact();
        }
        frames
    }

    #[test]
    fn fragmentation_invariance() {
        let mut stream = vec![];
        stream.extend(msg(b'R', &0i32.to_be_bytes()));
        stream.extend(msg(b'S', b"client_encoding\0UTF8\0"));
        stream.extend(msg(b'Z', b"I"));

        let whole = drive(&mut FrameReader::new(), &stream, stream.len());

        for chunk in [1, 2, 3, 7, 16] {
            let frames = drive(&mut FrameReader::new(), &stream, chunk);
            assert_eq!(frames, whole, "chunk size {chunk}");
        }
    }

    #[test]
    fn oversized_message_spills_and_frees() {
        let body = vec![b'x'; 20000];
        let stream = msg(b'T', &body);

        let mut reader = FrameReader::new();
        let frames = drive(&mut reader, &stream, 7000);

        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].0, b'T');
        assert_eq!(frames[0].1, body);

        // the spill buffer must not outlive its message
        assert!(reader.next_frame().unwrap().is_none());
        assert!(!reader.spilled());
    }

    #[test]
    fn small_message_after_oversized() {
        let mut stream = msg(b'T', &vec![b'x'; BUF_SIZE + 1]);
        stream.extend(msg(b'Z', b"I"));

        let frames = drive(&mut FrameReader::new(), &stream, 4096);
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[1], (b'Z', b"I".to_vec()));
    }

    #[test]
    fn partial_tail_is_compacted() {
        let mut stream = msg(b'Z', b"I");
        stream.extend(msg(b'Z', b"T"));
        let head = stream.len() - 2;

        let mut reader = FrameReader::new();
        let frames = drive(&mut reader, &stream[..head], head);
        assert_eq!(frames.len(), 1);
        // the partial second message sits at offset zero again
        assert_eq!(reader.curr_msg, 0);
        assert_eq!(reader.received, 4);

        let frames = drive(&mut reader, &stream[head..], 2);
        assert_eq!(frames, [(b'Z', b"T".to_vec())]);
    }

    #[test]
    fn negative_length_is_rejected() {
        let mut reader = FrameReader::new();
        let buf = reader.get_buffer();
        buf[..5].copy_from_slice(&[b'Z', 0, 0, 0, 3]);
        reader.fill(5);
        assert!(matches!(
            reader.next_frame(),
            Err(ProtocolError::InvalidMessageLength { length: 3 }),
        ));
    }

    #[test]
    fn empty_body_messages() {
        let mut stream = msg(b'1', b"");
        stream.extend(msg(b'2', b""));

        let frames = drive(&mut FrameReader::new(), &stream, stream.len());
        assert_eq!(frames, [(b'1', vec![]), (b'2', vec![])]);
    }
}
