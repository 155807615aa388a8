//! Framing codec: a `u32` big-endian length prefix followed by a
//! bincode-encoded record.
//!
//! Combines `LengthDelimitedCodec` (TCP framing) with bincode
//! (serialization). The codec is directional: a client encodes requests and
//! decodes responses, a server the reverse.

use std::io;
use std::marker::PhantomData;

use bytes::{Bytes, BytesMut};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio_util::codec::{Decoder, Encoder, LengthDelimitedCodec};

use crate::messages::{Request, Response};

/// Codec sending `Tx` records and receiving `Rx` records.
pub struct RpcCodec<Tx, Rx> {
    codec: LengthDelimitedCodec,
    _marker: PhantomData<fn(Tx) -> Rx>,
}

/// Codec for the calling side of a connection.
pub type ClientCodec = RpcCodec<Request, Response>;

/// Codec for the serving side of a connection.
pub type ServerCodec = RpcCodec<Response, Request>;

impl<Tx, Rx> RpcCodec<Tx, Rx> {
    pub fn new() -> Self {
        Self {
            codec: LengthDelimitedCodec::new(),
            _marker: PhantomData,
        }
    }
}

impl<Tx, Rx> Default for RpcCodec<Tx, Rx> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Tx: Serialize, Rx> Encoder<Tx> for RpcCodec<Tx, Rx> {
    type Error = io::Error;

    fn encode(&mut self, item: Tx, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let bytes =
            bincode::serialize(&item).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        self.codec.encode(Bytes::from(bytes), dst)
    }
}

impl<Tx, Rx: DeserializeOwned> Decoder for RpcCodec<Tx, Rx> {
    type Item = Rx;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.codec.decode(src)? {
            Some(bytes) => {
                let item = bincode::deserialize(&bytes)
                    .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
                Ok(Some(item))
            }
            None => Ok(None),
        }
    }
}
