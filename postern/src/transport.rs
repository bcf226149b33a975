//! The [`Transport`] trait.
use bytes::Bytes;

/// A byte-stream transport the session writes to.
///
/// The transport is externally owned; the session holds the handle granted
/// by [`connection_made`][1] and calls it with fully framed messages. The
/// inbound direction is driven the other way around: the transport fills
/// the region returned by [`get_buffer`][2] and reports written bytes with
/// [`buffer_updated`][3].
///
/// [1]: crate::Session::connection_made
/// [2]: crate::Session::get_buffer
/// [3]: crate::Session::buffer_updated
pub trait Transport {
    /// Write a complete message, or several concatenated messages.
    ///
    /// Must not block; queueing is the transport's concern.
    fn write(&mut self, bytes: Bytes);

    /// Whether the transport is already shutting down.
    fn is_closing(&self) -> bool;

    /// Close the transport.
    fn close(&mut self);
}

impl<T> Transport for &mut T where T: Transport {
    fn write(&mut self, bytes: Bytes) {
        T::write(self, bytes);
    }

    fn is_closing(&self) -> bool {
        T::is_closing(self)
    }

    fn close(&mut self) {
        T::close(self);
    }
}
