//! Vocabulary URIs used in container metadata, mostly from the AFF4 schema
//! plus a handful of RDF, OWL and XSD terms.

pub const AFF4: &str = "http://aff4.org/Schema#";

pub const TYPE: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#type";
pub const SAME_AS: &str = "http://www.w3.org/2002/07/owl#sameAs";

// xsd datatypes
pub const XSD_LONG: &str = "http://www.w3.org/2001/XMLSchema#long";
pub const XSD_INT: &str = "http://www.w3.org/2001/XMLSchema#int";
pub const XSD_DATETIME: &str = "http://www.w3.org/2001/XMLSchema#dateTime";
pub const XSD_BASE64: &str = "http://www.w3.org/2001/XMLSchema#base64Binary";

// classes
pub const VOLUME: &str = "http://aff4.org/Schema#Volume";
pub const IMAGE_STREAM: &str = "http://aff4.org/Schema#ImageStream";
pub const MAP: &str = "http://aff4.org/Schema#Map";
pub const UNKNOWN_DATA: &str = "http://aff4.org/Schema#UnknownData";
pub const IDENTITY: &str = "http://aff4.org/Schema#Identity";
pub const WARRANT: &str = "http://aff4.org/Schema#Warrant";

// storage
pub const CONTAINS: &str = "http://aff4.org/Schema#contains";
pub const STORED: &str = "http://aff4.org/Schema#stored";
pub const SIZE: &str = "http://aff4.org/Schema#size";
pub const CHUNK_SIZE: &str = "http://aff4.org/Schema#chunkSize";
pub const CHUNKS_IN_SEGMENT: &str = "http://aff4.org/Schema#chunksInSegment";
pub const COMPRESSION_METHOD: &str = "http://aff4.org/Schema#compressionMethod";
pub const HASH: &str = "http://aff4.org/Schema#hash";
pub const DATA_STREAM: &str = "http://aff4.org/Schema#dataStream";
pub const ORIGINAL_FILE_NAME: &str = "http://aff4.org/Schema#originalFileName";

// provenance
pub const CONTACT: &str = "http://aff4.org/Schema#email";
pub const PUBLIC_KEY_CERTIFICATE: &str = "http://aff4.org/Schema#publicKeyCertificate";
pub const AUTHORITY: &str = "http://aff4.org/Schema#authority";
pub const ASSERTS: &str = "http://aff4.org/Schema#asserts";
pub const ASSERTED_BY: &str = "http://aff4.org/Schema#assertedBy";
pub const DIGEST_METHOD: &str = "http://aff4.org/Schema#digestMethod";
pub const DIGEST_VALUE: &str = "http://aff4.org/Schema#digestValue";
pub const SIGNATURE: &str = "http://aff4.org/Schema#signature";
pub const SIGNED_AT: &str = "http://aff4.org/Schema#signedAt";

/// Digest method recorded for asserted graphs.
pub const SHA256_DIGEST: &str = "http://www.w3.org/2001/04/xmlenc#sha256";

/// Default name of the segment holding the serialized metadata graph.
pub const METADATA_SEGMENT: &str = "information.json";
