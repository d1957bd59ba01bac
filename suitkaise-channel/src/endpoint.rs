use std::cell::{Cell, RefCell};
use std::marker::PhantomData;
use std::os::fd::{FromRawFd, IntoRawFd, RawFd};
use std::os::unix::net::UnixStream;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::ChannelError;
use crate::framing::{self, Frame};

/// Direction marker: both send and receive are available.
pub struct Full;
/// Direction marker: send only (one-way mode).
pub struct SendOnly;
/// Direction marker: receive only (one-way mode).
pub struct RecvOnly;

pub trait CanSend {}
pub trait CanRecv {}
impl CanSend for Full {}
impl CanRecv for Full {}
impl CanSend for SendOnly {}
impl CanRecv for RecvOnly {}

fn send_on<M>(stream: &mut UnixStream, value: &impl Serialize) -> Result<(), ChannelError> {
    let bytes = suitkaise_serializer::encode(value)?;
    framing::framed_send_blocking(stream, &bytes)?;
    Ok(())
}

fn recv_on<T: DeserializeOwned>(stream: &mut UnixStream) -> Result<T, ChannelError> {
    match framing::framed_recv_blocking(stream)? {
        Frame::Message(bytes) => Ok(suitkaise_serializer::decode(&bytes)?),
        Frame::Closed => Err(ChannelError::Closed),
        Frame::NoMessage => unreachable!("blocking recv never times out"),
    }
}

/// `Ok(None)` means "no message" (timeout expired, peer still open).
fn recv_on_timeout<T: DeserializeOwned>(
    stream: &mut UnixStream,
    timeout: Duration,
) -> Result<Option<T>, ChannelError> {
    match framing::framed_recv_timeout(stream, timeout)? {
        Frame::Message(bytes) => Ok(Some(suitkaise_serializer::decode(&bytes)?)),
        Frame::Closed => Err(ChannelError::Closed),
        Frame::NoMessage => Ok(None),
    }
}

/// The non-transferable end of a [`crate::Channel`], held by the parent.
///
/// `Anchor` deliberately does not implement `Serialize` - attempting to
/// capture one inside a value that later crosses a process boundary is a
/// compile error, not a runtime `EndpointLocked` failure.
pub struct Anchor<M = Full> {
    stream: UnixStream,
    _role: PhantomData<M>,
}

impl<M> Anchor<M> {
    pub(crate) fn new(stream: UnixStream) -> Self {
        Self {
            stream,
            _role: PhantomData,
        }
    }

    pub fn close(self) {
        drop(self);
    }
}

impl<M: CanSend> Anchor<M> {
    pub fn send(&mut self, value: &impl Serialize) -> Result<(), ChannelError> {
        send_on::<M>(&mut self.stream, value)
    }
}

impl<M: CanRecv> Anchor<M> {
    pub fn recv<T: DeserializeOwned>(&mut self) -> Result<T, ChannelError> {
        recv_on(&mut self.stream)
    }

    pub fn recv_timeout<T: DeserializeOwned>(
        &mut self,
        timeout: Duration,
    ) -> Result<Option<T>, ChannelError> {
        recv_on_timeout(&mut self.stream, timeout)
    }
}

/// The transferable end of a [`crate::Channel`].
///
/// A `Point` may be handed to a subprocess by embedding it in a value passed
/// through `suitkaise-serializer`: `Serialize` writes the endpoint's raw file
/// descriptor, which is only meaningful to a process that inherited the same
/// descriptor table (a `fork`-then-`exec`'d child of the process that
/// created the pair - see `suitkaise-worker`'s spawn path). Each `Point` may
/// be transferred exactly once; a second attempt fails with
/// `EndpointLocked`.
pub struct Point<M = Full> {
    inner: RefCell<Option<UnixStream>>,
    locked: Cell<bool>,
    _role: PhantomData<M>,
}

impl<M> Point<M> {
    pub(crate) fn new(stream: UnixStream) -> Self {
        Self {
            inner: RefCell::new(Some(stream)),
            locked: Cell::new(false),
            _role: PhantomData,
        }
    }

    /// Consume the point, returning its raw file descriptor without closing
    /// it. Used by the process-spawning side of `suitkaise-worker` to dup
    /// the descriptor across `fork`/`exec`. After this call the `Point`'s
    /// local handle is gone; the caller is responsible for closing the raw
    /// fd in the parent once the child has inherited it (see
    /// `close_inherited_fd`), so the peer observes end-of-stream correctly.
    pub fn into_raw_fd(self) -> Result<RawFd, ChannelError> {
        if self.locked.get() {
            return Err(ChannelError::EndpointLocked);
        }
        let stream = self
            .inner
            .borrow_mut()
            .take()
            .ok_or(ChannelError::EndpointLocked)?;
        self.locked.set(true);
        Ok(stream.into_raw_fd())
    }

    /// Reconstruct a `Point` from a raw fd inherited across `fork`/`exec`.
    ///
    /// # Safety
    /// `fd` must be an open, valid socket fd of the expected kind, not owned
    /// by anything else in this process.
    pub unsafe fn from_raw_fd(fd: RawFd) -> Self {
        Self::new(UnixStream::from_raw_fd(fd))
    }

    pub fn close(self) {
        drop(self);
    }
}

impl<M: CanSend> Point<M> {
    pub fn send(&self, value: &impl Serialize) -> Result<(), ChannelError> {
        let mut guard = self.inner.borrow_mut();
        let stream = guard.as_mut().ok_or(ChannelError::EndpointLocked)?;
        send_on::<M>(stream, value)
    }
}

impl<M: CanRecv> Point<M> {
    pub fn recv<T: DeserializeOwned>(&self) -> Result<T, ChannelError> {
        let mut guard = self.inner.borrow_mut();
        let stream = guard.as_mut().ok_or(ChannelError::EndpointLocked)?;
        recv_on(stream)
    }

    pub fn recv_timeout<T: DeserializeOwned>(
        &self,
        timeout: Duration,
    ) -> Result<Option<T>, ChannelError> {
        let mut guard = self.inner.borrow_mut();
        let stream = guard.as_mut().ok_or(ChannelError::EndpointLocked)?;
        recv_on_timeout(stream, timeout)
    }
}

impl<M> Serialize for Point<M> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        if self.locked.get() {
            return Err(serde::ser::Error::custom(
                "EndpointLocked: point already delivered",
            ));
        }
        let stream = self.inner.borrow_mut().take().ok_or_else(|| {
            serde::ser::Error::custom("EndpointLocked: point already delivered")
        })?;
        self.locked.set(true);
        let fd = stream.into_raw_fd();
        (fd as i64).serialize(serializer)
    }
}

impl<'de, M> Deserialize<'de> for Point<M> {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let fd = i64::deserialize(deserializer)? as RawFd;
        // SAFETY: the fd was produced by this process's own `Serialize` impl
        // and is only valid to decode inside a process that inherited it
        // across fork/exec.
        Ok(unsafe { Self::from_raw_fd(fd) })
    }
}

/// Closes a raw fd the parent no longer needs after handing it to a child,
/// so the child observes end-of-stream correctly when it finishes.
#[cfg(unix)]
pub fn close_inherited_fd(fd: RawFd) -> Result<(), ChannelError> {
    nix::unistd::close(fd)
        .map_err(|errno| ChannelError::Io(std::io::Error::from_raw_os_error(errno as i32)))
}
