//! Host value model.
//!
//! [`Value`] is what the host sees on its side of the bridge. Primitive
//! variants are copied across the boundary; [`HostObject`], [`Symbol`] and
//! guest closures have identity and cross as reference ids.

use std::cell::{Ref, RefCell, RefMut};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use tether_types::{HostString, RefFlavor};

use crate::closure::{GuestClosure, GuestOnceClosure};

/// Native host callable stored inside a [`HostObject`].
pub type HostFn = Rc<dyn Fn(&[Value]) -> Value>;

/// A host value.
#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(HostString),
    /// Plain data array, copied element by element.
    Array(Vec<Value>),
    /// Plain data object, copied entry by entry.
    Object(Mapping),
    /// Host object with identity; crosses as a reference id.
    Reference(HostObject),
    Symbol(Symbol),
    /// Repeatable guest closure.
    Closure(GuestClosure),
    /// Guest closure callable at most once.
    OnceClosure(GuestOnceClosure),
}

impl Value {
    /// Short lowercase name of the variant, used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
            Value::Reference(_) => "reference",
            Value::Symbol(_) => "symbol",
            Value::Closure(_) | Value::OnceClosure(_) => "function",
        }
    }

    pub fn is_nullish(&self) -> bool {
        matches!(self, Value::Undefined | Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_host_string(&self) -> Option<&HostString> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Text content, lossily converted.
    pub fn as_string(&self) -> Option<String> {
        self.as_host_string().map(HostString::to_string_lossy)
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Mapping> {
        match self {
            Value::Object(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_reference(&self) -> Option<&HostObject> {
        match self {
            Value::Reference(obj) => Some(obj),
            _ => None,
        }
    }

    pub fn as_closure(&self) -> Option<&GuestClosure> {
        match self {
            Value::Closure(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_once_closure(&self) -> Option<&GuestOnceClosure> {
        match self {
            Value::OnceClosure(c) => Some(c),
            _ => None,
        }
    }
}

/// Structural equality for data; identity for references, symbols and
/// closures.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a == b,
            (Value::Reference(a), Value::Reference(b)) => a.ptr_eq(b),
            (Value::Symbol(a), Value::Symbol(b)) => a == b,
            (Value::Closure(a), Value::Closure(b)) => a.ptr_eq(b),
            (Value::OnceClosure(a), Value::OnceClosure(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => write!(f, "undefined"),
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) => write!(f, "{n}"),
            Value::String(s) => write!(f, "{s}"),
            Value::Array(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Value::Object(map) => {
                write!(f, "{{")?;
                for (i, (key, value)) in map.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{key}: {value}")?;
                }
                write!(f, "}}")
            }
            Value::Reference(obj) => write!(f, "[object {}]", obj.class()),
            Value::Symbol(sym) => write!(f, "Symbol({})", sym.description()),
            Value::Closure(_) | Value::OnceClosure(_) => write!(f, "[guest function]"),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(f64::from(n))
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(HostString::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(HostString::from(s))
    }
}

impl From<HostString> for Value {
    fn from(s: HostString) -> Self {
        Value::String(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Array(items)
    }
}

impl From<Mapping> for Value {
    fn from(map: Mapping) -> Self {
        Value::Object(map)
    }
}

impl From<HostObject> for Value {
    fn from(obj: HostObject) -> Self {
        Value::Reference(obj)
    }
}

impl From<Symbol> for Value {
    fn from(sym: Symbol) -> Self {
        Value::Symbol(sym)
    }
}

// ── Mapping ──────────────────────────────────────────────────────────────────

/// Insertion-ordered string-keyed map.
///
/// Entry order is the order keys are written to the guest, so it is kept
/// exactly as inserted. Replacing an existing key keeps its position.
/// `index` maps each key to its position in `entries`.
#[derive(Debug, Clone, Default)]
pub struct Mapping {
    entries: Vec<(HostString, Value)>,
    index: HashMap<HostString, usize>,
}

impl PartialEq for Mapping {
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries
    }
}

impl Mapping {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
            index: HashMap::with_capacity(capacity),
        }
    }

    /// Insert or replace; returns the previous value for the key.
    pub fn insert(&mut self, key: impl Into<HostString>, value: Value) -> Option<Value> {
        let key = key.into();
        if let Some(&position) = self.index.get(&key) {
            return Some(std::mem::replace(&mut self.entries[position].1, value));
        }
        self.index.insert(key.clone(), self.entries.len());
        self.entries.push((key, value));
        None
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.get_key(&HostString::from(key))
    }

    pub fn get_key(&self, key: &HostString) -> Option<&Value> {
        let &position = self.index.get(key)?;
        self.entries.get(position).map(|(_, v)| v)
    }

    /// Remove `key`, shifting later entries down one position.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        let position = self.index.remove(&HostString::from(key))?;
        let (_, value) = self.entries.remove(position);
        for (k, _) in &self.entries[position..] {
            if let Some(slot) = self.index.get_mut(k) {
                *slot -= 1;
            }
        }
        Some(value)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&HostString, &Value)> {
        self.entries.iter().map(|(k, v)| (k, v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &HostString> {
        self.entries.iter().map(|(k, _)| k)
    }
}

impl<K: Into<HostString>> FromIterator<(K, Value)> for Mapping {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        let mut map = Mapping::new();
        for (key, value) in iter {
            map.insert(key, value);
        }
        map
    }
}

// ── HostObject ───────────────────────────────────────────────────────────────

/// What a [`HostObject`] holds, which also decides the reference kind it
/// crosses the bridge as.
pub enum Shape {
    /// No inspectable structure (a handle, a resource).
    Opaque,
    /// Keyed properties; crosses as a host-object reference.
    Mapping(RefCell<Mapping>),
    /// Indexed elements; crosses as a host-array reference.
    Array(RefCell<Vec<Value>>),
    /// Native callable; crosses as a plain reference.
    Function(HostFn),
}

impl fmt::Debug for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Shape::Opaque => write!(f, "Opaque"),
            Shape::Mapping(map) => f.debug_tuple("Mapping").field(map).finish(),
            Shape::Array(items) => f.debug_tuple("Array").field(items).finish(),
            Shape::Function(_) => write!(f, "Function(..)"),
        }
    }
}

#[derive(Debug)]
struct HostObjectInner {
    class: String,
    shape: Shape,
}

/// Shared host object with identity.
///
/// Clones share the same object; equality is by identity.
#[derive(Debug, Clone)]
pub struct HostObject(Rc<HostObjectInner>);

impl HostObject {
    fn with_shape(class: &str, shape: Shape) -> Self {
        Self(Rc::new(HostObjectInner {
            class: class.to_string(),
            shape,
        }))
    }

    pub fn opaque(class: &str) -> Self {
        Self::with_shape(class, Shape::Opaque)
    }

    pub fn mapping(map: Mapping) -> Self {
        Self::with_shape("Object", Shape::Mapping(RefCell::new(map)))
    }

    pub fn array(items: Vec<Value>) -> Self {
        Self::with_shape("Array", Shape::Array(RefCell::new(items)))
    }

    pub fn function(f: impl Fn(&[Value]) -> Value + 'static) -> Self {
        Self::with_shape("Function", Shape::Function(Rc::new(f)))
    }

    pub fn class(&self) -> &str {
        &self.0.class
    }

    pub fn shape(&self) -> &Shape {
        &self.0.shape
    }

    /// Reference kind this object is encoded as.
    pub fn ref_flavor(&self) -> RefFlavor {
        match self.0.shape {
            Shape::Mapping(_) => RefFlavor::Object,
            Shape::Array(_) => RefFlavor::Array,
            Shape::Opaque | Shape::Function(_) => RefFlavor::Plain,
        }
    }

    pub fn borrow_mapping(&self) -> Option<Ref<'_, Mapping>> {
        match &self.0.shape {
            Shape::Mapping(map) => Some(map.borrow()),
            _ => None,
        }
    }

    pub fn borrow_mapping_mut(&self) -> Option<RefMut<'_, Mapping>> {
        match &self.0.shape {
            Shape::Mapping(map) => Some(map.borrow_mut()),
            _ => None,
        }
    }

    pub fn borrow_array(&self) -> Option<Ref<'_, Vec<Value>>> {
        match &self.0.shape {
            Shape::Array(items) => Some(items.borrow()),
            _ => None,
        }
    }

    pub fn borrow_array_mut(&self) -> Option<RefMut<'_, Vec<Value>>> {
        match &self.0.shape {
            Shape::Array(items) => Some(items.borrow_mut()),
            _ => None,
        }
    }

    /// Call a function-shaped object. `None` for every other shape.
    pub fn call(&self, args: &[Value]) -> Option<Value> {
        match &self.0.shape {
            Shape::Function(f) => Some(f(args)),
            _ => None,
        }
    }

    pub fn ptr_eq(&self, other: &HostObject) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn address(&self) -> usize {
        Rc::as_ptr(&self.0) as *const () as usize
    }
}

// ── Symbol ───────────────────────────────────────────────────────────────────

static NEXT_SYMBOL: AtomicU64 = AtomicU64::new(1);

/// Unique token. Two symbols are equal only if one is a clone of the other.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Symbol {
    token: u64,
    description: Rc<str>,
}

impl Symbol {
    pub fn new(description: &str) -> Self {
        Self {
            token: NEXT_SYMBOL.fetch_add(1, Ordering::Relaxed),
            description: Rc::from(description),
        }
    }

    pub fn token(&self) -> u64 {
        self.token
    }

    pub fn description(&self) -> &str {
        &self.description
    }
}
