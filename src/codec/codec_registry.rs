use crate::codec::{CodecError, CompressType, Compressor, GzipCompressor, SerializeType};
use crate::constants::DEFAULT_COMPRESS_THRESHOLD;
use once_cell::sync::Lazy;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Process-wide registry holding every built-in codec.
static SHARED_REGISTRY: Lazy<Arc<CodecRegistry>> =
    Lazy::new(|| Arc::new(CodecRegistry::builder().build()));

/// Lookup table from wire tags to payload serializers and compressors.
///
/// A registry is assembled once through [`CodecRegistryBuilder`] and is
/// read-only afterwards; clients and servers share it behind an `Arc`.
pub struct CodecRegistry {
    serializers: Vec<SerializeType>,
    compressors: HashMap<CompressType, Arc<dyn Compressor>>,
    compress_threshold: usize,
}

impl fmt::Debug for CodecRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CodecRegistry")
            .field("serializers", &self.serializers)
            .field("compressors", &self.compressors.keys().collect::<Vec<_>>())
            .field("compress_threshold", &self.compress_threshold)
            .finish()
    }
}

impl CodecRegistry {
    /// Returns the shared registry containing all built-in codecs.
    pub fn shared() -> Arc<CodecRegistry> {
        SHARED_REGISTRY.clone()
    }

    /// Starts a builder pre-populated with the built-in codecs.
    pub fn builder() -> CodecRegistryBuilder {
        CodecRegistryBuilder::new()
            .with_serializers(SerializeType::ALL)
            .with_compressor(CompressType::Gzip, Arc::new(GzipCompressor::default()))
    }

    pub fn compress_threshold(&self) -> usize {
        self.compress_threshold
    }

    pub fn supports_serialize_type(&self, serialize_type: SerializeType) -> bool {
        self.serializers.contains(&serialize_type)
    }

    pub fn supports_compress_type(&self, compress_type: CompressType) -> bool {
        compress_type == CompressType::None || self.compressors.contains_key(&compress_type)
    }

    /// Resolves a wire tag into a registered serializer.
    pub fn serializer(&self, tag: u8) -> Result<SerializeType, CodecError> {
        SerializeType::try_from(tag)
            .ok()
            .filter(|serialize_type| self.supports_serialize_type(*serialize_type))
            .ok_or(CodecError::UnsupportedSerializeType(tag))
    }

    fn compressor(&self, compress_type: CompressType) -> Result<&dyn Compressor, CodecError> {
        self.compressors
            .get(&compress_type)
            .map(|compressor| compressor.as_ref())
            .ok_or(CodecError::UnsupportedCompressType(compress_type.into()))
    }

    /// Serializes `value` and compresses the result when it exceeds the
    /// threshold.
    ///
    /// # Returns
    ///
    /// The payload bytes together with the compressor that was actually
    /// applied, which is `CompressType::None` for small payloads.
    pub fn encode_payload<T>(
        &self,
        serialize_type: SerializeType,
        compress_type: CompressType,
        value: &T,
    ) -> Result<(Vec<u8>, CompressType), CodecError>
    where
        T: Serialize + ?Sized,
    {
        if !self.supports_serialize_type(serialize_type) {
            return Err(CodecError::UnsupportedSerializeType(serialize_type.into()));
        }

        let bytes = serialize_type.encode(value)?;
        self.compress_payload(compress_type, bytes)
    }

    /// Compresses `payload` with `compress_type` if it is above the threshold.
    pub fn compress_payload(
        &self,
        compress_type: CompressType,
        payload: Vec<u8>,
    ) -> Result<(Vec<u8>, CompressType), CodecError> {
        if compress_type == CompressType::None || payload.len() <= self.compress_threshold {
            return Ok((payload, CompressType::None));
        }

        let compressed = self.compressor(compress_type)?.compress(&payload)?;
        tracing::trace!(
            "Compressed payload with {:?}: {} -> {} bytes",
            compress_type,
            payload.len(),
            compressed.len()
        );
        Ok((compressed, compress_type))
    }

    /// Reverses the compressor named by the wire tag.
    pub fn decompress_payload(&self, compress_tag: u8, payload: Vec<u8>) -> Result<Vec<u8>, CodecError> {
        let compress_type = CompressType::try_from(compress_tag)
            .map_err(|_| CodecError::UnsupportedCompressType(compress_tag))?;

        match compress_type {
            CompressType::None => Ok(payload),
            other => self.compressor(other)?.decompress(&payload),
        }
    }

    /// Decompresses and deserializes a payload using the wire tags it arrived with.
    pub fn decode_payload<T>(
        &self,
        serialize_tag: u8,
        compress_tag: u8,
        payload: Vec<u8>,
    ) -> Result<T, CodecError>
    where
        T: DeserializeOwned,
    {
        let serialize_type = self.serializer(serialize_tag)?;
        let bytes = self.decompress_payload(compress_tag, payload)?;
        serialize_type.decode(&bytes)
    }
}

/// Assembles a [`CodecRegistry`].
pub struct CodecRegistryBuilder {
    serializers: Vec<SerializeType>,
    compressors: HashMap<CompressType, Arc<dyn Compressor>>,
    compress_threshold: usize,
}

impl Default for CodecRegistryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl CodecRegistryBuilder {
    /// An empty builder: no serializers, no compressors.
    pub fn new() -> Self {
        Self {
            serializers: Vec::new(),
            compressors: HashMap::new(),
            compress_threshold: DEFAULT_COMPRESS_THRESHOLD,
        }
    }

    pub fn with_serializer(mut self, serialize_type: SerializeType) -> Self {
        if !self.serializers.contains(&serialize_type) {
            self.serializers.push(serialize_type);
        }
        self
    }

    pub fn with_serializers(self, serialize_types: impl IntoIterator<Item = SerializeType>) -> Self {
        serialize_types
            .into_iter()
            .fold(self, |builder, serialize_type| builder.with_serializer(serialize_type))
    }

    pub fn without_serializer(mut self, serialize_type: SerializeType) -> Self {
        self.serializers.retain(|existing| *existing != serialize_type);
        self
    }

    /// Registers `compressor` under `compress_type`, replacing any previous one.
    ///
    /// `CompressType::None` is implicit and cannot be overridden.
    pub fn with_compressor(mut self, compress_type: CompressType, compressor: Arc<dyn Compressor>) -> Self {
        if compress_type != CompressType::None {
            self.compressors.insert(compress_type, compressor);
        }
        self
    }

    pub fn compress_threshold(mut self, threshold: usize) -> Self {
        self.compress_threshold = threshold;
        self
    }

    pub fn build(self) -> CodecRegistry {
        CodecRegistry {
            serializers: self.serializers,
            compressors: self.compressors,
            compress_threshold: self.compress_threshold,
        }
    }
}
