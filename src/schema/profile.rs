/*
 * Data structures for the canonical profile schema.
 *
 * The prost crate (https://crates.io/crates/prost) was used to generate this
 * file from profmerge/proto/profile.proto.
 *
 * Every table in the canonical schema is indexed by position: a record's id
 * is its index, index 0 is the reserved "absent" sentinel, and ids are dense
 * by construction.
 *
 * EVERYTHING BELOW THIS LINE HAS BEEN AUTO-GENERATED */
/// A binary (executable, shared object or synthetic image) samples were
/// taken from.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Binary {
    /// Path of the binary on disk, or a virtual abstraction like "\[vdso\]".
    ///
    /// Index into string table
    #[prost(uint32, tag="1")]
    pub path: u32,
    /// Build identifier of the binary, e.g. the .note.gnu.build-id contents.
    ///
    /// Index into string table
    #[prost(uint32, tag="2")]
    pub build_id: u32,
}
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Function {
    /// Name of the function, in human-readable form if available.
    ///
    /// Index into string table
    #[prost(uint32, tag="1")]
    pub name: u32,
    /// Name of the function, as identified by the system.
    ///
    /// Index into string table
    #[prost(uint32, tag="2")]
    pub system_name: u32,
    /// Source file containing the function.
    ///
    /// Index into string table
    #[prost(uint32, tag="3")]
    pub file_name: u32,
    /// Line number of the function definition in the source file.
    #[prost(uint32, tag="4")]
    pub start_line: u32,
}
/// One line of an inline chain.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SourceLine {
    /// Index into the function table
    #[prost(uint32, tag="1")]
    pub function_id: u32,
    /// Line number in source code.
    #[prost(uint32, tag="2")]
    pub line: u32,
    /// Column number in source code, 0 when unknown.
    #[prost(uint32, tag="3")]
    pub column: u32,
}
/// The inlined call stack at a single program-counter site, innermost
/// line first.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct InlineChain {
    #[prost(message, repeated, tag="1")]
    pub lines: ::prost::alloc::vec::Vec<SourceLine>,
}
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct StackFrame {
    /// Index into the binary table
    #[prost(uint32, tag="1")]
    pub binary_id: u32,
    /// File offset into the binary, not the runtime virtual address.
    /// May be negative for malformed mappings; the sign is preserved.
    #[prost(int64, tag="2")]
    pub binary_offset: i64,
    /// Index into the inline chain table, 0 for un-symbolized frames.
    #[prost(uint32, tag="3")]
    pub inline_chain_id: u32,
}
/// A contiguous frame sequence shared across stacks for storage economy.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct StackSegment {
    /// Indices into the frame table
    #[prost(uint32, repeated, tag="1")]
    pub frame_ids: ::prost::alloc::vec::Vec<u32>,
}
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Stack {
    #[prost(enumeration="StackKind", tag="1")]
    pub kind: i32,
    /// Name of the runtime that produced the stack, e.g. "python".
    ///
    /// Index into string table
    #[prost(uint32, tag="2")]
    pub runtime_name: u32,
    /// Innermost frames that do not fill a whole segment.
    ///
    /// Indices into the frame table
    #[prost(uint32, repeated, tag="3")]
    pub frame_ids: ::prost::alloc::vec::Vec<u32>,
    /// Segments holding the remaining frames, ordered from innermost to
    /// outermost. The full stack is frame_ids ++ concat(segments),
    /// innermost frame first.
    ///
    /// Indices into the stack segment table
    #[prost(uint32, repeated, tag="4")]
    pub segment_ids: ::prost::alloc::vec::Vec<u32>,
}
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Thread {
    #[prost(uint64, tag="1")]
    pub thread_id: u64,
    /// Index into string table
    #[prost(uint32, tag="2")]
    pub thread_name: u32,
    #[prost(uint64, tag="3")]
    pub process_id: u64,
    /// Index into string table
    #[prost(uint32, tag="4")]
    pub process_name: u32,
    /// Containers (workloads) the thread runs in, sorted ascending.
    ///
    /// Indices into string table
    #[prost(uint32, repeated, tag="5")]
    pub containers: ::prost::alloc::vec::Vec<u32>,
}
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Label {
    /// Index into string table
    #[prost(uint32, tag="1")]
    pub key: u32,
    #[prost(oneof="label::Value", tags="2, 3, 4")]
    pub value: ::core::option::Option<label::Value>,
}
/// Nested message and enum types in `Label`.
pub mod label {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Value {
        /// Index into string table
        #[prost(uint32, tag="2")]
        Str(u32),
        #[prost(int64, tag="3")]
        Num(i64),
        #[prost(double, tag="4")]
        Real(f64),
    }
}
/// The "where" of a sample. Samples with equal keys combine by summing
/// values.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SampleKey {
    /// Indices into the stack table
    #[prost(uint32, repeated, tag="1")]
    pub stack_ids: ::prost::alloc::vec::Vec<u32>,
    /// Index into the thread table
    #[prost(uint32, tag="2")]
    pub thread_id: u32,
    /// Nanoseconds past the epoch, 0 when absent.
    #[prost(int64, tag="3")]
    pub timestamp_ns: i64,
    /// Sorted by label key string id ascending.
    ///
    /// Indices into the label table
    #[prost(uint32, repeated, tag="4")]
    pub label_ids: ::prost::alloc::vec::Vec<u32>,
}
/// ValueType describes the semantics and measurement units of a value.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ValueType {
    /// Index into string table
    #[prost(uint32, tag="1")]
    pub r#type: u32,
    /// Index into string table
    #[prost(uint32, tag="2")]
    pub unit: u32,
}
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Sample {
    /// Index into the sample key table
    #[prost(uint32, tag="1")]
    pub key_id: u32,
    /// One value per entry of Profile.value_types.
    #[prost(uint64, repeated, tag="2")]
    pub values: ::prost::alloc::vec::Vec<u64>,
}
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Profile {
    /// A common table for strings referenced by various messages.
    /// string_table\[0\] must always be "".
    #[prost(string, repeated, tag="1")]
    pub string_table: ::prost::alloc::vec::Vec<::prost::alloc::string::String>,
    #[prost(message, repeated, tag="2")]
    pub binaries: ::prost::alloc::vec::Vec<Binary>,
    #[prost(message, repeated, tag="3")]
    pub functions: ::prost::alloc::vec::Vec<Function>,
    #[prost(message, repeated, tag="4")]
    pub inline_chains: ::prost::alloc::vec::Vec<InlineChain>,
    #[prost(message, repeated, tag="5")]
    pub frames: ::prost::alloc::vec::Vec<StackFrame>,
    #[prost(message, repeated, tag="6")]
    pub stack_segments: ::prost::alloc::vec::Vec<StackSegment>,
    #[prost(message, repeated, tag="7")]
    pub stacks: ::prost::alloc::vec::Vec<Stack>,
    #[prost(message, repeated, tag="8")]
    pub threads: ::prost::alloc::vec::Vec<Thread>,
    #[prost(message, repeated, tag="9")]
    pub labels: ::prost::alloc::vec::Vec<Label>,
    #[prost(message, repeated, tag="10")]
    pub sample_keys: ::prost::alloc::vec::Vec<SampleKey>,
    #[prost(message, repeated, tag="11")]
    pub value_types: ::prost::alloc::vec::Vec<ValueType>,
    #[prost(message, repeated, tag="12")]
    pub samples: ::prost::alloc::vec::Vec<Sample>,
    /// Freeform text associated to the profile.
    ///
    /// Indices into string table
    #[prost(uint32, repeated, tag="13")]
    pub comments: ::prost::alloc::vec::Vec<u32>,
    /// Index into value_types of the preferred sample value.
    #[prost(uint32, tag="14")]
    pub default_value_type_index: u32,
    /// Index into value_types of the period type.
    #[prost(uint32, tag="15")]
    pub period_value_type_index: u32,
    /// The number of events between sampled occurrences.
    #[prost(uint64, tag="16")]
    pub period: u64,
}
/// Options controlling how profiles are merged.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct MergeOptions {
    /// Rewrite thread records with process_id = 0 and process_name = 0
    /// before interning, collapsing samples across processes.
    #[prost(bool, tag="1")]
    pub ignore_process_ids: bool,
    /// As above, for thread_id and thread_name.
    #[prost(bool, tag="2")]
    pub ignore_thread_ids: bool,
    /// Zero every sample timestamp before building the sample key.
    #[prost(bool, tag="3")]
    pub ignore_timestamps: bool,
    /// Strip a trailing -?\d+ suffix from thread names before interning.
    #[prost(bool, tag="4")]
    pub cleanup_thread_names: bool,
    #[prost(message, optional, tag="5")]
    pub label_filter: ::core::option::Option<LabelFilter>,
}
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct LabelFilter {
    /// Labels whose key starts with any listed prefix are dropped.
    #[prost(string, repeated, tag="1")]
    pub skipped_key_prefixes: ::prost::alloc::vec::Vec<::prost::alloc::string::String>,
    /// If non-empty, only labels whose key is listed survive.
    #[prost(string, repeated, tag="2")]
    pub allowed_keys: ::prost::alloc::vec::Vec<::prost::alloc::string::String>,
}
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum StackKind {
    Native = 0,
    Python = 1,
    Kernel = 2,
    Php = 3,
    Other = 4,
}
impl StackKind {
    /// String value of the enum field names used in the ProtoBuf definition.
    ///
    /// The values are not transformed in any way and thus are considered stable
    /// (if the ProtoBuf definition does not change) and safe for programmatic use.
    pub fn as_str_name(&self) -> &'static str {
        match self {
            StackKind::Native => "NATIVE",
            StackKind::Python => "PYTHON",
            StackKind::Kernel => "KERNEL",
            StackKind::Php => "PHP",
            StackKind::Other => "OTHER",
        }
    }
    /// Creates an enum from field names used in the ProtoBuf definition.
    pub fn from_str_name(value: &str) -> ::core::option::Option<Self> {
        match value {
            "NATIVE" => Some(Self::Native),
            "PYTHON" => Some(Self::Python),
            "KERNEL" => Some(Self::Kernel),
            "PHP" => Some(Self::Php),
            "OTHER" => Some(Self::Other),
            _ => None,
        }
    }
}
