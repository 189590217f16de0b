//! Loose argument lists and their resolution into a structured call.
//!
//! Friendly wrappers accept arguments in any order: a video, an options
//! mapping, a callback, a label, a count. Each [`CallArg`] carries one or
//! more capabilities; [`classify`] maps it to a single [`ArgumentKind`]
//! using a fixed priority, and [`ArgSeparator`] folds the list into a
//! [`ResolvedCall`] where later arguments of the same kind win.

use std::fmt;

use image::DynamicImage;
use serde_json::Value;
use tracing::debug;

use super::Callback;
use crate::domain::{MediaHandle, ModelOptions, PixelBuffer, VideoSource};
use crate::error::{Error, Result};

/// The single category an argument resolves to.
///
/// Declaration order is the classification priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArgumentKind {
    /// Completion callback.
    Callback,
    /// Video, image or pixel buffer.
    Media,
    /// Options mapping.
    Options,
    /// String hint.
    Text,
    /// Numeric hint.
    Number,
    /// Nothing kindml understands; ignored.
    Other,
}

/// One opaque caller-supplied argument.
///
/// Most arguments carry a single capability and are built with `From`.
/// Composite arguments offering several capabilities are built with the
/// `with_*` methods and still resolve to one kind.
pub struct CallArg<T> {
    callback: Option<Callback<T>>,
    media: Option<MediaHandle>,
    options: Option<ModelOptions>,
    text: Option<String>,
    number: Option<f64>,
}

impl<T> CallArg<T> {
    /// An argument with no recognizable capability.
    #[must_use]
    pub const fn other() -> Self {
        Self {
            callback: None,
            media: None,
            options: None,
            text: None,
            number: None,
        }
    }

    /// A completion callback.
    #[must_use]
    pub fn callback<F>(f: F) -> Self
    where
        F: FnOnce(Result<&T, &Error>) + Send + 'static,
    {
        Self::other().with_callback(f)
    }

    /// Adds a callback capability.
    #[must_use]
    pub fn with_callback<F>(mut self, f: F) -> Self
    where
        F: FnOnce(Result<&T, &Error>) + Send + 'static,
    {
        self.callback = Some(Box::new(f));
        self
    }

    /// Adds a media capability.
    ///
    /// When an argument offers both a video and a still representation, the
    /// video is kept.
    #[must_use]
    pub fn with_media(mut self, media: impl Into<MediaHandle>) -> Self {
        let media = media.into();
        let keep_video = matches!(self.media, Some(MediaHandle::VideoFrame(_)))
            && !matches!(media, MediaHandle::VideoFrame(_));
        if !keep_video {
            self.media = Some(media);
        }
        self
    }

    /// Adds an options capability.
    #[must_use]
    pub fn with_options(mut self, options: ModelOptions) -> Self {
        self.options = Some(options);
        self
    }

    /// Adds a string capability.
    #[must_use]
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    /// Adds a numeric capability.
    #[must_use]
    pub const fn with_number(mut self, number: f64) -> Self {
        self.number = Some(number);
        self
    }

    /// The kind this argument resolves to.
    #[must_use]
    pub fn kind(&self) -> ArgumentKind {
        classify(self)
    }
}

/// Maps an argument to exactly one kind.
///
/// Priority: callback, media, options, text, number. Arguments with no
/// capability are [`ArgumentKind::Other`].
#[must_use]
pub fn classify<T>(arg: &CallArg<T>) -> ArgumentKind {
    if arg.callback.is_some() {
        ArgumentKind::Callback
    } else if arg.media.is_some() {
        ArgumentKind::Media
    } else if arg.options.is_some() {
        ArgumentKind::Options
    } else if arg.text.is_some() {
        ArgumentKind::Text
    } else if arg.number.is_some() {
        ArgumentKind::Number
    } else {
        ArgumentKind::Other
    }
}

impl<T> fmt::Debug for CallArg<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallArg")
            .field("kind", &self.kind())
            .field("callback", &self.callback.is_some())
            .field("media", &self.media)
            .field("options", &self.options)
            .field("text", &self.text)
            .field("number", &self.number)
            .finish()
    }
}

impl<T> From<MediaHandle> for CallArg<T> {
    fn from(media: MediaHandle) -> Self {
        Self::other().with_media(media)
    }
}

impl<T> From<VideoSource> for CallArg<T> {
    fn from(video: VideoSource) -> Self {
        Self::other().with_media(video)
    }
}

impl<T> From<DynamicImage> for CallArg<T> {
    fn from(image: DynamicImage) -> Self {
        Self::other().with_media(image)
    }
}

impl<T> From<PixelBuffer> for CallArg<T> {
    fn from(buffer: PixelBuffer) -> Self {
        Self::other().with_media(buffer)
    }
}

impl<T> From<ModelOptions> for CallArg<T> {
    fn from(options: ModelOptions) -> Self {
        Self::other().with_options(options)
    }
}

impl<T> From<&str> for CallArg<T> {
    fn from(text: &str) -> Self {
        Self::other().with_text(text)
    }
}

impl<T> From<String> for CallArg<T> {
    fn from(text: String) -> Self {
        Self::other().with_text(text)
    }
}

impl<T> From<f64> for CallArg<T> {
    fn from(number: f64) -> Self {
        Self::other().with_number(number)
    }
}

impl<T> From<f32> for CallArg<T> {
    fn from(number: f32) -> Self {
        Self::other().with_number(f64::from(number))
    }
}

impl<T> From<i32> for CallArg<T> {
    fn from(number: i32) -> Self {
        Self::other().with_number(f64::from(number))
    }
}

impl<T> From<u32> for CallArg<T> {
    fn from(number: u32) -> Self {
        Self::other().with_number(f64::from(number))
    }
}

impl<T> From<Value> for CallArg<T> {
    /// Untyped JSON: objects are options, strings text, numbers numbers.
    fn from(value: Value) -> Self {
        match value {
            Value::Object(map) => Self::other().with_options(ModelOptions::from(map)),
            Value::String(text) => Self::other().with_text(text),
            Value::Number(n) => n
                .as_f64()
                .map_or_else(Self::other, |n| Self::other().with_number(n)),
            Value::Null | Value::Bool(_) | Value::Array(_) => Self::other(),
        }
    }
}

/// Builds a `Vec<CallArg<_>>` from heterogeneous values.
///
/// ```
/// use kindml_core::{call_args, CallArg, ModelOptions};
///
/// let args: Vec<CallArg<()>> = call_args![
///     ModelOptions::new().with("threshold", 0.3),
///     "MobileNet",
///     CallArg::callback(|_result| {}),
/// ];
/// assert_eq!(args.len(), 3);
/// ```
#[macro_export]
macro_rules! call_args {
    () => {
        ::std::vec::Vec::new()
    };
    ($($arg:expr),+ $(,)?) => {
        ::std::vec![$($crate::CallArg::from($arg)),+]
    };
}

/// A slot of [`ResolvedCall`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    /// The media slot.
    Media,
    /// The options slot.
    Options,
    /// The callback slot.
    Callback,
    /// The string hint slot.
    ExtraString,
    /// The numeric hint slot.
    ExtraNumber,
}

impl Field {
    /// Returns the slot name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Media => "media",
            Self::Options => "options",
            Self::Callback => "callback",
            Self::ExtraString => "extra_string",
            Self::ExtraNumber => "extra_number",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A loose argument list folded into named slots.
pub struct ResolvedCall<T> {
    /// Call-time media, or the separator's default.
    pub media: Option<MediaHandle>,
    /// Per-call options.
    pub options: Option<ModelOptions>,
    /// Completion callback.
    pub callback: Option<Callback<T>>,
    /// Last string argument.
    pub extra_string: Option<String>,
    /// Last numeric argument.
    pub extra_number: Option<f64>,
}

impl<T> ResolvedCall<T> {
    /// Returns true if the slot is bound.
    #[must_use]
    pub const fn has(&self, field: Field) -> bool {
        match field {
            Field::Media => self.media.is_some(),
            Field::Options => self.options.is_some(),
            Field::Callback => self.callback.is_some(),
            Field::ExtraString => self.extra_string.is_some(),
            Field::ExtraNumber => self.extra_number.is_some(),
        }
    }

    /// Fails when the slot is empty.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingArgument`] carrying `message`.
    pub fn require(&self, field: Field, message: impl Into<String>) -> Result<()> {
        if self.has(field) {
            Ok(())
        } else {
            Err(Error::MissingArgument(message.into()))
        }
    }

    /// Returns the media, failing when it is missing.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingArgument`] carrying `message`.
    pub fn require_media(&self, message: impl Into<String>) -> Result<&MediaHandle> {
        self.media
            .as_ref()
            .ok_or_else(|| Error::MissingArgument(message.into()))
    }
}

impl<T> Default for ResolvedCall<T> {
    fn default() -> Self {
        Self {
            media: None,
            options: None,
            callback: None,
            extra_string: None,
            extra_number: None,
        }
    }
}

impl<T> fmt::Debug for ResolvedCall<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedCall")
            .field("media", &self.media)
            .field("options", &self.options)
            .field("callback", &self.callback.is_some())
            .field("extra_string", &self.extra_string)
            .field("extra_number", &self.extra_number)
            .finish()
    }
}

/// Resolves loose argument lists against an optional default media.
#[derive(Debug, Clone, Default)]
pub struct ArgSeparator {
    default_media: Option<MediaHandle>,
}

impl ArgSeparator {
    /// A separator without default media.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            default_media: None,
        }
    }

    /// Uses `media` when a call supplies none of its own.
    #[must_use]
    pub fn with_default_media(mut self, media: Option<MediaHandle>) -> Self {
        self.default_media = media;
        self
    }

    /// Folds `args` left to right into a [`ResolvedCall`].
    pub fn separate<T>(&self, args: impl IntoIterator<Item = CallArg<T>>) -> ResolvedCall<T> {
        let mut call = ResolvedCall::default();

        for (index, arg) in args.into_iter().enumerate() {
            let kind = arg.kind();
            let replaced = match kind {
                ArgumentKind::Callback => call.callback.replace_with(arg.callback),
                ArgumentKind::Media => call.media.replace_with(arg.media),
                ArgumentKind::Options => call.options.replace_with(arg.options),
                ArgumentKind::Text => call.extra_string.replace_with(arg.text),
                ArgumentKind::Number => call.extra_number.replace_with(arg.number),
                ArgumentKind::Other => {
                    debug!("Ignoring unrecognized argument at position {index}");
                    false
                }
            };
            if replaced {
                debug!("Argument at position {index} overrides an earlier {kind:?} argument");
            }
        }

        if call.media.is_none() {
            call.media.clone_from(&self.default_media);
        }

        call
    }
}

/// Shorthand for [`ArgSeparator::new().separate(args)`](ArgSeparator::separate).
pub fn separate<T>(args: impl IntoIterator<Item = CallArg<T>>) -> ResolvedCall<T> {
    ArgSeparator::new().separate(args)
}

trait ReplaceWith<V> {
    /// Stores `value` if present, returning true when a value was replaced.
    fn replace_with(&mut self, value: Option<V>) -> bool;
}

impl<V> ReplaceWith<V> for Option<V> {
    fn replace_with(&mut self, value: Option<V>) -> bool {
        value.is_some_and(|v| self.replace(v).is_some())
    }
}
