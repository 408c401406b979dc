/*
 * Copyright 2025 Security Union LLC
 *
 * Licensed under either of
 *
 * * Apache License, Version 2.0
 *   (http://www.apache.org/licenses/LICENSE-2.0)
 * * MIT license
 *   (http://opensource.org/licenses/MIT)
 *
 * at your option.
 *
 * Unless you explicitly state otherwise, any contribution intentionally
 * submitted for inclusion in the work by you, as defined in the Apache-2.0
 * license, shall be dual licensed as above, without any additional terms or
 * conditions.
 */

//! Wire messages exchanged between contexts.
//!
//! A message is a JSON document `{name, args, direction, error?}`. Resources
//! that move between contexts instead of being copied ride beside it in a
//! transfer list.

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

use animsync_types::{ImageBuffer, Transferable};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ChannelError, DispatchError};
use crate::handle::Kind;

static MESSAGE_COUNT: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleMethod {
    Init,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileMethod {
    Load,
    Width,
    Height,
    Duration,
    Destroy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewMethod {
    Init,
    Play,
    Pause,
    SetRepeatCount,
    SetProgress,
    Flush,
    Destroy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderMethod {
    Constructor,
    Prepare,
    RenderToTexture,
    Destroy,
}

/// Every remote operation, by kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Module(ModuleMethod),
    File(FileMethod),
    View(ViewMethod),
    VideoReader(ReaderMethod),
}

impl Method {
    pub fn kind(self) -> Kind {
        match self {
            Method::Module(_) => Kind::Module,
            Method::File(_) => Kind::File,
            Method::View(_) => Kind::View,
            Method::VideoReader(_) => Kind::VideoReader,
        }
    }

    /// `"<Kind>.<method>"`, the base of every message name.
    pub fn as_str(self) -> &'static str {
        match self {
            Method::Module(ModuleMethod::Init) => "Module.init",
            Method::File(FileMethod::Load) => "File.load",
            Method::File(FileMethod::Width) => "File.width",
            Method::File(FileMethod::Height) => "File.height",
            Method::File(FileMethod::Duration) => "File.duration",
            Method::File(FileMethod::Destroy) => "File.destroy",
            Method::View(ViewMethod::Init) => "View.init",
            Method::View(ViewMethod::Play) => "View.play",
            Method::View(ViewMethod::Pause) => "View.pause",
            Method::View(ViewMethod::SetRepeatCount) => "View.setRepeatCount",
            Method::View(ViewMethod::SetProgress) => "View.setProgress",
            Method::View(ViewMethod::Flush) => "View.flush",
            Method::View(ViewMethod::Destroy) => "View.destroy",
            Method::VideoReader(ReaderMethod::Constructor) => "VideoReader.constructor",
            Method::VideoReader(ReaderMethod::Prepare) => "VideoReader.prepare",
            Method::VideoReader(ReaderMethod::RenderToTexture) => "VideoReader.renderToTexture",
            Method::VideoReader(ReaderMethod::Destroy) => "VideoReader.destroy",
        }
    }

    /// A fresh message name for one call of this method.
    pub fn call_name(self) -> String {
        let count = MESSAGE_COUNT.fetch_add(1, Ordering::Relaxed);
        format!("{}_{count}", self.as_str())
    }

    /// Recovers the method from a message name produced by [`Method::call_name`].
    pub fn from_name(name: &str) -> Result<Self, DispatchError> {
        let base = name.rsplit_once('_').map_or(name, |(base, _)| base);
        base.parse()
    }
}

impl FromStr for Method {
    type Err = DispatchError;

    fn from_str(base: &str) -> Result<Self, Self::Err> {
        let method = match base {
            "Module.init" => Method::Module(ModuleMethod::Init),
            "File.load" => Method::File(FileMethod::Load),
            "File.width" => Method::File(FileMethod::Width),
            "File.height" => Method::File(FileMethod::Height),
            "File.duration" => Method::File(FileMethod::Duration),
            "File.destroy" => Method::File(FileMethod::Destroy),
            "View.init" => Method::View(ViewMethod::Init),
            "View.play" => Method::View(ViewMethod::Play),
            "View.pause" => Method::View(ViewMethod::Pause),
            "View.setRepeatCount" => Method::View(ViewMethod::SetRepeatCount),
            "View.setProgress" => Method::View(ViewMethod::SetProgress),
            "View.flush" => Method::View(ViewMethod::Flush),
            "View.destroy" => Method::View(ViewMethod::Destroy),
            "VideoReader.constructor" => Method::VideoReader(ReaderMethod::Constructor),
            "VideoReader.prepare" => Method::VideoReader(ReaderMethod::Prepare),
            "VideoReader.renderToTexture" => Method::VideoReader(ReaderMethod::RenderToTexture),
            "VideoReader.destroy" => Method::VideoReader(ReaderMethod::Destroy),
            other => return Err(DispatchError::UnknownMethod(other.to_string())),
        };
        Ok(method)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Expects a reply with the same name.
    Call,
    /// Fire and forget; no reply is sent.
    Notify,
    Reply,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub name: String,
    #[serde(default)]
    pub args: Vec<Value>,
    pub direction: Direction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip)]
    pub transfer: Vec<Transferable>,
}

impl Message {
    pub fn call(name: String, args: Vec<Value>, transfer: Vec<Transferable>) -> Self {
        Self {
            name,
            args,
            direction: Direction::Call,
            error: None,
            transfer,
        }
    }

    pub fn reply(name: String, payload: Payload) -> Self {
        Self {
            name,
            args: payload.args,
            direction: Direction::Reply,
            error: None,
            transfer: payload.transfer,
        }
    }

    pub fn failure(name: String, error: String) -> Self {
        Self {
            name,
            args: Vec::new(),
            direction: Direction::Reply,
            error: Some(error),
            transfer: Vec::new(),
        }
    }

    pub fn method(&self) -> Result<Method, DispatchError> {
        Method::from_name(&self.name)
    }

    /// Deserializes argument `index` for `method`.
    pub fn arg<T: DeserializeOwned>(
        &self,
        method: Method,
        index: usize,
    ) -> Result<T, DispatchError> {
        let value = self
            .args
            .get(index)
            .cloned()
            .ok_or(DispatchError::MissingArgument {
                method: method.as_str(),
                index,
            })?;
        serde_json::from_value(value).map_err(|err| DispatchError::InvalidArgument {
            method: method.as_str(),
            index,
            detail: err.to_string(),
        })
    }

    /// Serializes the copied part. Transferables move into the packet untouched.
    pub fn encode(self) -> Result<Packet, ChannelError> {
        let payload = serde_json::to_string(&self)?;
        Ok(Packet {
            payload,
            transfer: self.transfer,
        })
    }

    pub fn decode(packet: Packet) -> Result<Self, ChannelError> {
        let mut message: Message = serde_json::from_str(&packet.payload)?;
        message.transfer = packet.transfer;
        Ok(message)
    }
}

/// What actually crosses the context boundary.
#[derive(Debug)]
pub struct Packet {
    pub payload: String,
    pub transfer: Vec<Transferable>,
}

/// Arguments plus transferables, the body of a call or a reply.
#[derive(Debug, Default)]
pub struct Payload {
    pub args: Vec<Value>,
    pub transfer: Vec<Transferable>,
}

impl Payload {
    pub fn new(args: Vec<Value>) -> Self {
        Self {
            args,
            transfer: Vec::new(),
        }
    }

    pub fn with_transfer(mut self, transferable: Transferable) -> Self {
        self.transfer.push(transferable);
        self
    }

    /// Deserializes reply argument `index`. `name` is the call being answered.
    pub fn arg<T: DeserializeOwned>(&self, name: &str, index: usize) -> Result<T, ChannelError> {
        let value = self
            .args
            .get(index)
            .cloned()
            .ok_or_else(|| ChannelError::UnexpectedReply {
                name: name.to_string(),
                detail: format!("missing argument {index}"),
            })?;
        serde_json::from_value(value).map_err(|err| ChannelError::UnexpectedReply {
            name: name.to_string(),
            detail: format!("argument {index}: {err}"),
        })
    }

    /// Takes the first transferred image, if any.
    pub fn take_image(&mut self) -> Option<ImageBuffer> {
        let index = self
            .transfer
            .iter()
            .position(|item| matches!(item, Transferable::Image(_)))?;
        self.transfer.remove(index).into_image()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn call_names_are_unique_and_parse_back() {
        let method = Method::View(ViewMethod::SetRepeatCount);
        let first = method.call_name();
        let second = method.call_name();
        assert_ne!(first, second);
        assert!(first.starts_with("View.setRepeatCount_"));
        assert_eq!(Method::from_name(&first).unwrap(), method);
    }

    #[test]
    fn unknown_methods_are_typed_errors() {
        assert!(matches!(
            Method::from_name("View.explode_3"),
            Err(DispatchError::UnknownMethod(name)) if name == "View.explode"
        ));
    }

    #[test]
    fn wire_shape_omits_transfer() {
        let message = Message::call(
            "File.load_7".to_string(),
            vec![json!(1)],
            vec![Transferable::Buffer(vec![1, 2, 3])],
        );
        let packet = message.encode().unwrap();
        let wire: Value = serde_json::from_str(&packet.payload).unwrap();
        assert_eq!(
            wire,
            json!({"name": "File.load_7", "args": [1], "direction": "call"})
        );
        assert_eq!(packet.transfer.len(), 1);

        let decoded = Message::decode(packet).unwrap();
        assert_eq!(decoded.transfer, vec![Transferable::Buffer(vec![1, 2, 3])]);
    }

    #[test]
    fn failure_carries_error_text() {
        let message = Message::failure("View.play_1".to_string(), "gone".to_string());
        let wire = serde_json::to_value(&message).unwrap();
        assert_eq!(wire["error"], "gone");
        assert_eq!(wire["direction"], "reply");
    }

    #[test]
    fn argument_errors_name_the_method() {
        let message = Message::call("View.setProgress_2".to_string(), vec![json!("x")], vec![]);
        let method = Method::View(ViewMethod::SetProgress);
        assert!(matches!(
            message.arg::<f64>(method, 0),
            Err(DispatchError::InvalidArgument { index: 0, .. })
        ));
        assert!(matches!(
            message.arg::<f64>(method, 1),
            Err(DispatchError::MissingArgument { index: 1, .. })
        ));
    }

    #[test]
    fn take_image_skips_other_transferables() {
        let image = ImageBuffer::solid(1, 1, [9, 9, 9, 255]);
        let mut payload = Payload::new(vec![json!(true)])
            .with_transfer(Transferable::Buffer(vec![0]))
            .with_transfer(Transferable::Image(image.clone()));
        assert_eq!(payload.take_image(), Some(image));
        assert_eq!(payload.take_image(), None);
        assert!(payload.arg::<bool>("VideoReader.prepare_0", 0).unwrap());
    }
}
