//! RG-007: BLAKE3 fingerprints for resources, files, and directories.
//!
//! A resource hash covers its type name and declared inputs only. Outputs
//! never contribute, so reporting new outputs does not trigger an update.
//!
//! Unordered containers (maps, sets, object attributes) are folded by
//! fingerprinting every entry into its own byte string, sorting those byte
//! strings, and feeding them in order. Sorting serialised entries rather than
//! keys gives composite keys a total order too, and makes the digest independent
//! of iteration order.
//!
//! Types with no meaningful fingerprint (closures, channels, trait objects)
//! have no [`Fingerprint`] impl, so a typed resource holding one fails to
//! compile instead of hashing garbage.

use crate::core::types::Resource;
use crate::core::value::{Number, Value, ValueType};
use crate::resources::ResourceImpl;
use indexmap::IndexMap;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::io::Read;
use std::path::Path;

const STREAM_BUF_SIZE: usize = 65536;

// Value variant tags
const TAG_NULL: u8 = 0;
const TAG_UNKNOWN: u8 = 1;
const TAG_BOOL: u8 = 2;
const TAG_NUMBER: u8 = 3;
const TAG_STRING: u8 = 4;
const TAG_LIST: u8 = 5;
const TAG_ENTRIES: u8 = 6;

/// Deterministic traversal into a [`Fingerprinter`].
pub trait Fingerprint {
    fn fingerprint(&self, fp: &mut Fingerprinter);
}

enum Sink {
    Digest(Box<blake3::Hasher>),
    Buffer(Vec<u8>),
}

/// Accumulates the canonical byte stream of a value.
pub struct Fingerprinter {
    sink: Sink,
}

impl Default for Fingerprinter {
    fn default() -> Self {
        Self::new()
    }
}

impl Fingerprinter {
    pub fn new() -> Self {
        Self {
            sink: Sink::Digest(Box::new(blake3::Hasher::new())),
        }
    }

    fn buffer() -> Self {
        Self {
            sink: Sink::Buffer(Vec::new()),
        }
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        match &mut self.sink {
            Sink::Digest(h) => {
                h.update(bytes);
            }
            Sink::Buffer(b) => b.extend_from_slice(bytes),
        }
    }

    pub fn write_tag(&mut self, tag: u8) {
        self.write_bytes(&[tag]);
    }

    pub fn write_len(&mut self, len: usize) {
        self.write_bytes(&(len as u64).to_le_bytes());
    }

    /// Length-prefixed, so adjacent strings cannot run together.
    pub fn write_str(&mut self, s: &str) {
        self.write_len(s.len());
        self.write_bytes(s.as_bytes());
    }

    /// A named struct field. Call in declaration order.
    pub fn field<T: Fingerprint + ?Sized>(&mut self, name: &str, value: &T) {
        self.write_str(name);
        value.fingerprint(self);
    }

    /// Fold entries whose iteration order carries no meaning.
    pub fn write_unordered<I, E>(&mut self, entries: I)
    where
        I: IntoIterator<Item = E>,
        E: Fingerprint,
    {
        let mut encoded: Vec<Vec<u8>> = entries.into_iter().map(|e| encode(&e)).collect();
        encoded.sort_unstable();
        self.write_len(encoded.len());
        for entry in &encoded {
            self.write_len(entry.len());
            self.write_bytes(entry);
        }
    }

    /// `"blake3:{hex}"` of everything written so far.
    pub fn finish(self) -> String {
        let hash = match self.sink {
            Sink::Digest(h) => h.finalize(),
            Sink::Buffer(b) => blake3::hash(&b),
        };
        format!("blake3:{}", hash.to_hex())
    }
}

fn encode<T: Fingerprint + ?Sized>(value: &T) -> Vec<u8> {
    let mut fp = Fingerprinter::buffer();
    value.fingerprint(&mut fp);
    match fp.sink {
        Sink::Buffer(b) => b,
        Sink::Digest(_) => Vec::new(),
    }
}

/// Fingerprint of a resource's type and declared input.
pub fn compute(resource: &Resource) -> String {
    let mut fp = Fingerprinter::new();
    fp.write_str(&resource.resource_type);
    resource.input.fingerprint(&mut fp);
    fp.finish()
}

/// Fingerprint of a typed instance: its kind name and typed input fields.
pub fn compute_instance<R: ResourceImpl + ?Sized>(resource: &R) -> String {
    let mut fp = Fingerprinter::new();
    fp.write_str(resource.type_name());
    resource.fingerprint(&mut fp);
    fp.finish()
}

// ============================================================================
// Primitive impls
// ============================================================================

macro_rules! fingerprint_le {
    ($($t:ty),*) => {
        $(
            impl Fingerprint for $t {
                fn fingerprint(&self, fp: &mut Fingerprinter) {
                    fp.write_bytes(&self.to_le_bytes());
                }
            }
        )*
    };
}

fingerprint_le!(u8, u16, u32, u64, u128, i8, i16, i32, i64, i128);

impl Fingerprint for usize {
    fn fingerprint(&self, fp: &mut Fingerprinter) {
        (*self as u64).fingerprint(fp);
    }
}

impl Fingerprint for isize {
    fn fingerprint(&self, fp: &mut Fingerprinter) {
        (*self as i64).fingerprint(fp);
    }
}

impl Fingerprint for f32 {
    fn fingerprint(&self, fp: &mut Fingerprinter) {
        fp.write_bytes(&self.to_bits().to_le_bytes());
    }
}

impl Fingerprint for f64 {
    fn fingerprint(&self, fp: &mut Fingerprinter) {
        fp.write_bytes(&self.to_bits().to_le_bytes());
    }
}

impl Fingerprint for bool {
    fn fingerprint(&self, fp: &mut Fingerprinter) {
        fp.write_tag(u8::from(*self));
    }
}

impl Fingerprint for char {
    fn fingerprint(&self, fp: &mut Fingerprinter) {
        (*self as u32).fingerprint(fp);
    }
}

impl Fingerprint for str {
    fn fingerprint(&self, fp: &mut Fingerprinter) {
        fp.write_str(self);
    }
}

impl Fingerprint for String {
    fn fingerprint(&self, fp: &mut Fingerprinter) {
        fp.write_str(self);
    }
}

// ============================================================================
// Wrappers and sequences
// ============================================================================

/// `None` contributes nothing.
impl<T: Fingerprint> Fingerprint for Option<T> {
    fn fingerprint(&self, fp: &mut Fingerprinter) {
        if let Some(v) = self {
            v.fingerprint(fp);
        }
    }
}

impl<T: Fingerprint + ?Sized> Fingerprint for &T {
    fn fingerprint(&self, fp: &mut Fingerprinter) {
        (**self).fingerprint(fp);
    }
}

impl<T: Fingerprint + ?Sized> Fingerprint for Box<T> {
    fn fingerprint(&self, fp: &mut Fingerprinter) {
        (**self).fingerprint(fp);
    }
}

impl<T: Fingerprint> Fingerprint for [T] {
    fn fingerprint(&self, fp: &mut Fingerprinter) {
        fp.write_len(self.len());
        for item in self {
            item.fingerprint(fp);
        }
    }
}

impl<T: Fingerprint, const N: usize> Fingerprint for [T; N] {
    fn fingerprint(&self, fp: &mut Fingerprinter) {
        self.as_slice().fingerprint(fp);
    }
}

impl<T: Fingerprint> Fingerprint for Vec<T> {
    fn fingerprint(&self, fp: &mut Fingerprinter) {
        self.as_slice().fingerprint(fp);
    }
}

impl Fingerprint for () {
    fn fingerprint(&self, _fp: &mut Fingerprinter) {}
}

/// Pairs visit sequentially; a complex number is `(re, im)`.
impl<A: Fingerprint, B: Fingerprint> Fingerprint for (A, B) {
    fn fingerprint(&self, fp: &mut Fingerprinter) {
        self.0.fingerprint(fp);
        self.1.fingerprint(fp);
    }
}

impl<A: Fingerprint, B: Fingerprint, C: Fingerprint> Fingerprint for (A, B, C) {
    fn fingerprint(&self, fp: &mut Fingerprinter) {
        self.0.fingerprint(fp);
        self.1.fingerprint(fp);
        self.2.fingerprint(fp);
    }
}

// ============================================================================
// Unordered containers
// ============================================================================

impl<K: Fingerprint, V: Fingerprint> Fingerprint for BTreeMap<K, V> {
    fn fingerprint(&self, fp: &mut Fingerprinter) {
        fp.write_unordered(self.iter());
    }
}

impl<K: Fingerprint, V: Fingerprint, S> Fingerprint for HashMap<K, V, S> {
    fn fingerprint(&self, fp: &mut Fingerprinter) {
        fp.write_unordered(self.iter());
    }
}

impl<K: Fingerprint, V: Fingerprint, S> Fingerprint for IndexMap<K, V, S> {
    fn fingerprint(&self, fp: &mut Fingerprinter) {
        fp.write_unordered(self.iter());
    }
}

impl<T: Fingerprint> Fingerprint for BTreeSet<T> {
    fn fingerprint(&self, fp: &mut Fingerprinter) {
        fp.write_unordered(self.iter());
    }
}

impl<T: Fingerprint, S> Fingerprint for HashSet<T, S> {
    fn fingerprint(&self, fp: &mut Fingerprinter) {
        fp.write_unordered(self.iter());
    }
}

// ============================================================================
// Value model
// ============================================================================

impl Fingerprint for Number {
    fn fingerprint(&self, fp: &mut Fingerprinter) {
        if let Some(i) = self.as_i64() {
            fp.write_tag(b'i');
            i.fingerprint(fp);
        } else if let Some(u) = self.as_u64() {
            fp.write_tag(b'u');
            u.fingerprint(fp);
        } else {
            fp.write_tag(b'f');
            self.as_f64().unwrap_or(f64::NAN).fingerprint(fp);
        }
    }
}

impl Fingerprint for ValueType {
    fn fingerprint(&self, fp: &mut Fingerprinter) {
        fp.write_str(&self.to_string());
    }
}

impl Fingerprint for Value {
    fn fingerprint(&self, fp: &mut Fingerprinter) {
        match self {
            Value::Null => fp.write_tag(TAG_NULL),
            Value::Unknown(ty) => {
                fp.write_tag(TAG_UNKNOWN);
                ty.fingerprint(fp);
            }
            Value::Bool(b) => {
                fp.write_tag(TAG_BOOL);
                b.fingerprint(fp);
            }
            Value::Number(n) => {
                fp.write_tag(TAG_NUMBER);
                n.fingerprint(fp);
            }
            Value::String(s) => {
                fp.write_tag(TAG_STRING);
                fp.write_str(s);
            }
            Value::List(items) => {
                fp.write_tag(TAG_LIST);
                items.fingerprint(fp);
            }
            // maps and objects serialise alike, so a snapshot reload keeps the hash
            Value::Map(entries) | Value::Object(entries) => {
                fp.write_tag(TAG_ENTRIES);
                entries.fingerprint(fp);
            }
        }
    }
}

// ============================================================================
// Files and directories
// ============================================================================

/// Hash a file's contents. Returns `"blake3:{hex}"`.
pub fn hash_file(path: &Path) -> Result<String, String> {
    let mut file =
        std::fs::File::open(path).map_err(|e| format!("cannot open {}: {}", path.display(), e))?;
    let mut hasher = blake3::Hasher::new();
    let mut buf = [0u8; STREAM_BUF_SIZE];
    loop {
        let n = file
            .read(&mut buf)
            .map_err(|e| format!("read error {}: {}", path.display(), e))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("blake3:{}", hasher.finalize().to_hex()))
}

/// Hash a string. Returns `"blake3:{hex}"`.
pub fn hash_string(s: &str) -> String {
    format!("blake3:{}", blake3::hash(s.as_bytes()).to_hex())
}

/// Hash a directory tree: sorted walk, relative paths included, symlinks skipped.
pub fn hash_directory(path: &Path) -> Result<String, String> {
    let mut entries: Vec<(String, String)> = Vec::new();
    walk(path, path, &mut entries)?;

    let components: Vec<String> = entries
        .iter()
        .map(|(rel, hash)| format!("{}\0{}", rel, hash))
        .collect();
    let refs: Vec<&str> = components.iter().map(String::as_str).collect();
    Ok(composite_hash(&refs))
}

fn walk(base: &Path, current: &Path, entries: &mut Vec<(String, String)>) -> Result<(), String> {
    let read_dir = std::fs::read_dir(current)
        .map_err(|e| format!("cannot read dir {}: {}", current.display(), e))?;
    let mut children: Vec<std::fs::DirEntry> = read_dir.filter_map(|e| e.ok()).collect();
    children.sort_by_key(|e| e.file_name());

    for entry in children {
        let ft = entry
            .file_type()
            .map_err(|e| format!("stat error: {}", e))?;
        if ft.is_symlink() {
            continue;
        }
        let path = entry.path();
        let rel = path
            .strip_prefix(base)
            .map_err(|e| format!("path prefix error: {}", e))?
            .to_string_lossy()
            .to_string();
        if ft.is_file() {
            let hash = hash_file(&path)?;
            entries.push((rel, hash));
        } else if ft.is_dir() {
            walk(base, &path, entries)?;
        }
    }
    Ok(())
}

/// Ordered combination of component hashes.
pub fn composite_hash(components: &[&str]) -> String {
    let mut hasher = blake3::Hasher::new();
    for c in components {
        hasher.update(c.as_bytes());
        hasher.update(b"\0");
    }
    format!("blake3:{}", hasher.finalize().to_hex())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queue(input: Value) -> Resource {
        Resource::new("jobs", "aws_sqs_queue").with_input(input)
    }

    #[derive(Debug)]
    struct Tagged {
        name: String,
        retries: Option<u32>,
        tags: HashMap<String, String>,
    }

    impl Fingerprint for Tagged {
        fn fingerprint(&self, fp: &mut Fingerprinter) {
            fp.field("name", &self.name);
            fp.field("retries", &self.retries);
            fp.field("tags", &self.tags);
        }
    }

    #[test]
    fn test_rg007_compute_format() {
        let h = compute(&queue(Value::object([("name", Value::from("jobs"))])));
        assert!(h.starts_with("blake3:"));
        assert_eq!(h.len(), 7 + 64);
    }

    #[test]
    fn test_rg007_map_order_does_not_matter() {
        let a = queue(Value::object([
            ("name", Value::from("jobs")),
            (
                "tags",
                Value::map([("team", Value::from("infra")), ("env", Value::from("prod"))]),
            ),
        ]));
        let b = queue(Value::object([
            (
                "tags",
                Value::map([("env", Value::from("prod")), ("team", Value::from("infra"))]),
            ),
            ("name", Value::from("jobs")),
        ]));
        assert_eq!(compute(&a), compute(&b));
    }

    #[test]
    fn test_rg007_output_never_contributes() {
        let input = Value::object([("name", Value::from("jobs"))]);
        let bare = queue(input.clone());
        let provisioned =
            queue(input).with_output(Value::object([("url", Value::from("https://sqs/1"))]));
        assert_eq!(compute(&bare), compute(&provisioned));
    }

    #[test]
    fn test_rg007_input_and_type_changes_change_hash() {
        let base = queue(Value::object([("timeout", Value::from(30))]));
        let changed = queue(Value::object([("timeout", Value::from(31))]));
        assert_ne!(compute(&base), compute(&changed));

        let mut retyped = base.clone();
        retyped.resource_type = "aws_sns_topic".into();
        assert_ne!(compute(&base), compute(&retyped));
    }

    #[test]
    fn test_rg007_null_unknown_and_zero_differ() {
        let hashes: HashSet<String> = [
            Value::Null,
            Value::unknown(ValueType::String),
            Value::unknown(ValueType::Number),
            Value::from(""),
            Value::from(0),
            Value::from(false),
            Value::List(Vec::new()),
            Value::empty_object(),
        ]
        .into_iter()
        .map(|v| compute(&queue(Value::object([("x", v)]))))
        .collect();
        assert_eq!(hashes.len(), 8);
    }

    #[test]
    fn test_rg007_map_and_object_hash_alike() {
        let entries = [("a", Value::from(1)), ("b", Value::from(2))];
        let as_map = queue(Value::object([("x", Value::map(entries.clone()))]));
        let as_object = queue(Value::object([("x", Value::object(entries))]));
        assert_eq!(compute(&as_map), compute(&as_object));
    }

    #[test]
    fn test_rg007_list_order_matters() {
        let a = queue(Value::object([("ports", Value::from(vec![80, 443]))]));
        let b = queue(Value::object([("ports", Value::from(vec![443, 80]))]));
        assert_ne!(compute(&a), compute(&b));
    }

    #[test]
    fn test_rg007_repeated_hashmap_fingerprint_is_stable() {
        let mut tags = HashMap::new();
        for i in 0..32 {
            tags.insert(format!("key-{}", i), format!("value-{}", i));
        }
        let t = Tagged {
            name: "svc".into(),
            retries: Some(3),
            tags,
        };
        let first = encode(&t);
        for _ in 0..100 {
            assert_eq!(encode(&t), first);
        }
    }

    #[test]
    fn test_rg007_none_contributes_nothing() {
        let mut a = Fingerprinter::new();
        a.write_str("x");
        None::<u32>.fingerprint(&mut a);
        let mut b = Fingerprinter::new();
        b.write_str("x");
        assert_eq!(a.finish(), b.finish());
    }

    #[test]
    fn test_rg007_map_kinds_agree() {
        let btree: BTreeMap<(u8, u8), bool> = [((1, 2), true), ((0, 9), false)].into();
        let hash: HashMap<(u8, u8), bool> = [((0, 9), false), ((1, 2), true)].into();
        assert_eq!(encode(&btree), encode(&hash));
    }

    #[test]
    fn test_rg007_strings_do_not_run_together() {
        assert_ne!(encode(&("ab", "c")), encode(&("a", "bc")));
    }

    #[test]
    fn test_rg007_integer_widths_are_distinct() {
        assert_eq!(encode(&7u8).len(), 1);
        assert_eq!(encode(&7u64).len(), 8);
        assert_eq!(encode(&-7i128).len(), 16);
        assert_eq!(encode(&(1.5f64, -2.0f64)).len(), 16);
    }

    #[test]
    fn test_rg007_hash_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.txt");
        std::fs::write(&path, "hello world").unwrap();
        let h = hash_file(&path).unwrap();
        assert_eq!(h, hash_string("hello world"));
        assert!(hash_file(Path::new("/nonexistent/file.txt")).is_err());
    }

    #[test]
    fn test_rg007_hash_directory_order_independent_of_creation() {
        let d1 = tempfile::tempdir().unwrap();
        std::fs::write(d1.path().join("b.txt"), "bbb").unwrap();
        std::fs::write(d1.path().join("a.txt"), "aaa").unwrap();

        let d2 = tempfile::tempdir().unwrap();
        std::fs::write(d2.path().join("a.txt"), "aaa").unwrap();
        std::fs::write(d2.path().join("b.txt"), "bbb").unwrap();

        assert_eq!(
            hash_directory(d1.path()).unwrap(),
            hash_directory(d2.path()).unwrap()
        );
    }

    #[test]
    fn test_rg007_hash_directory_skips_symlinks() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("root.txt"), "root").unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("sub").join("nested.txt"), "nested").unwrap();
        let before = hash_directory(dir.path()).unwrap();

        #[cfg(unix)]
        {
            std::os::unix::fs::symlink(dir.path().join("root.txt"), dir.path().join("link.txt"))
                .unwrap();
            assert_eq!(hash_directory(dir.path()).unwrap(), before);
        }

        std::fs::write(dir.path().join("sub").join("nested.txt"), "changed").unwrap();
        assert_ne!(hash_directory(dir.path()).unwrap(), before);
    }

    #[test]
    fn test_rg007_composite_hash_is_ordered() {
        let h = composite_hash(&["blake3:aaa", "blake3:bbb"]);
        assert_ne!(h, composite_hash(&["blake3:bbb", "blake3:aaa"]));
    }
}
