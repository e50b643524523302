use std::{
    collections::{HashMap, HashSet},
    fmt,
    path::PathBuf,
    rc::Rc,
};

use parking_lot::RwLock;
use parse::{
    attributes::CodeAttribute,
    classfile::ClassFile,
    flags::MethodAccessFlags,
    parser::parse_file,
};
use support::{
    descriptor::{BaseType, FieldType, MethodType},
    types::FieldDescriptor,
};
use tracing::debug;

use crate::{error::VmError, stack::Cell};

pub const JAVA_LANG_OBJECT: &str = "java/lang/Object";

#[derive(Debug, Clone)]
pub struct LoadedField {
    pub name: String,
    pub descriptor: String,
    pub ty: FieldType,
    pub is_static: bool,
    /// Slot in the static area, or in the instance area after every inherited field.
    pub offset: u16,
    /// Index of the declaring field in the class file, if there is one.
    pub source_index: Option<usize>,
}

impl LoadedField {
    pub fn slots(&self) -> usize {
        self.ty.slots()
    }
}

pub struct LoadedMethod {
    pub name: String,
    pub descriptor: String,
    pub ty: MethodType,
    pub flags: MethodAccessFlags,
    pub code: Option<CodeAttribute>,
}

impl LoadedMethod {
    pub fn is_static(&self) -> bool {
        self.flags.is_static()
    }

    pub fn is_native(&self) -> bool {
        self.flags.is_native()
    }
}

impl fmt::Debug for LoadedMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.name, self.descriptor)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitState {
    Uninitialised,
    Initialising,
    Initialised,
}

/// A class linked into the method area.
pub struct LoadedClass {
    pub name: String,
    /// `None` for host classes, which exist only through their native module.
    pub class_file: Option<ClassFile>,
    pub super_class: Option<Rc<LoadedClass>>,
    pub interfaces: Vec<Rc<LoadedClass>>,

    pub fields: Vec<LoadedField>,
    pub methods: Vec<Rc<LoadedMethod>>,

    pub static_field_count: u16,
    /// Instance slots including every inherited one.
    pub instance_field_count: u16,

    init_state: RwLock<InitState>,
    static_data: RwLock<Vec<Cell>>,
}

impl fmt::Debug for LoadedClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadedClass")
            .field("name", &self.name)
            .field("super_class", &self.super_class.as_ref().map(|s| &s.name))
            .field("fields", &self.fields)
            .field("methods", &self.methods)
            .finish()
    }
}

impl LoadedClass {
    pub fn is_host(&self) -> bool {
        self.class_file.is_none()
    }

    pub fn init_state(&self) -> InitState {
        *self.init_state.read()
    }

    pub fn set_init_state(&self, state: InitState) {
        *self.init_state.write() = state;
    }

    /// Zeroed static slots, typed by each field's descriptor.
    pub fn allocate_statics(&self) {
        let mut data = vec![Cell::int(0); self.static_field_count as usize];

        for field in self.fields.iter().filter(|f| f.is_static) {
            for (i, cell) in Cell::default_for(&field.descriptor).into_iter().enumerate() {
                if let Some(slot) = data.get_mut(field.offset as usize + i) {
                    *slot = cell;
                }
            }
        }

        *self.static_data.write() = data;
    }

    pub fn get_static(&self, field: &LoadedField) -> Result<Vec<Cell>, VmError> {
        let data = self.static_data.read();
        let start = field.offset as usize;

        data.get(start..start + field.slots())
            .map(|cells| cells.to_vec())
            .ok_or_else(|| VmError::FieldResolution {
                class_name: self.name.clone(),
                field: format!("{} (static data not allocated)", field.name),
            })
    }

    pub fn set_static(&self, field: &LoadedField, cells: &[Cell]) -> Result<(), VmError> {
        if cells.len() != field.slots() {
            return Err(crate::internal!(
                "{} cells do not fit {}:{} ({} slots)",
                cells.len(),
                field.name,
                field.descriptor,
                field.slots()
            ));
        }

        let mut data = self.static_data.write();
        let start = field.offset as usize;

        let slots = data
            .get_mut(start..start + field.slots())
            .ok_or_else(|| VmError::FieldResolution {
                class_name: self.name.clone(),
                field: format!("{} (static data not allocated)", field.name),
            })?;

        slots.copy_from_slice(cells);
        Ok(())
    }

    pub fn field(&self, name: &str, descriptor: &str) -> Option<&LoadedField> {
        self.fields
            .iter()
            .find(|f| f.name == name && f.descriptor == descriptor)
    }

    pub fn method(&self, name: &str, descriptor: &str) -> Option<Rc<LoadedMethod>> {
        self.methods
            .iter()
            .find(|m| m.name == name && m.descriptor == descriptor)
            .cloned()
    }
}

fn is_primitive(descriptor: &str) -> bool {
    let mut chars = descriptor.chars();
    matches!(
        (chars.next().and_then(BaseType::from_char), chars.next()),
        (Some(base), None) if base != BaseType::Void
    )
}

/// Finds, parses and links classes by name. Resolution is idempotent, a registered class is
/// never parsed twice.
pub struct ClassLoader {
    class_path: Vec<PathBuf>,
    classes: HashMap<String, Rc<LoadedClass>>,
    load_order: Vec<String>,
    resolving: HashSet<String>,
    host_classes: HashMap<String, Vec<FieldDescriptor>>,
}

impl Default for ClassLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ClassLoader {
    pub fn new() -> Self {
        Self {
            class_path: vec![],
            classes: HashMap::new(),
            load_order: vec![],
            resolving: HashSet::new(),
            host_classes: HashMap::new(),
        }
    }

    pub fn add_path(&mut self, path: impl Into<PathBuf>) -> &mut Self {
        self.class_path.push(path.into());
        self
    }

    pub fn class_path(&self) -> &[PathBuf] {
        &self.class_path
    }

    /// Make `name` resolvable without a class file, with the given static fields.
    pub fn register_host(&mut self, name: impl Into<String>, static_fields: Vec<FieldDescriptor>) {
        self.host_classes.insert(name.into(), static_fields);
    }

    pub fn classes(&self) -> &HashMap<String, Rc<LoadedClass>> {
        &self.classes
    }

    pub fn get(&self, name: &str) -> Option<Rc<LoadedClass>> {
        self.classes.get(name).cloned()
    }

    /// The class registered most recently.
    pub fn last_loaded(&self) -> Option<Rc<LoadedClass>> {
        self.load_order.last().and_then(|name| self.get(name))
    }

    fn resolve_name(&self, name: &str) -> Option<PathBuf> {
        let formatted_name = format!("{}.class", name);

        let relative = PathBuf::from(&formatted_name);
        if relative.exists() {
            return Some(relative);
        }

        self.class_path
            .iter()
            .map(|root| root.join(&formatted_name))
            .find(|path| path.exists())
    }

    /// Resolve a class or array type by name.
    ///
    /// Arrays resolve their element class; an array of primitives resolves to `None`.
    pub fn for_name(&mut self, name: &str) -> Result<Option<Rc<LoadedClass>>, VmError> {
        if let Some(element) = name.strip_prefix('[') {
            let element = element.trim_start_matches('[');

            return match element.strip_prefix('L').and_then(|e| e.strip_suffix(';')) {
                Some(inner) => self.for_name(inner),
                None if is_primitive(element) => Ok(None),
                None => Err(VmError::ClassNotFound(name.to_string())),
            };
        }

        self.resolve_class(name).map(Some)
    }

    /// Resolve a plain (non-array) class by name.
    pub fn resolve_class(&mut self, name: &str) -> Result<Rc<LoadedClass>, VmError> {
        if let Some(class) = self.classes.get(name) {
            debug!("Fast path: {}", name);
            return Ok(Rc::clone(class));
        }

        debug!("Slow path: {}", name);

        if let Some(path) = self.resolve_name(name) {
            let class_file = parse_file(&path).map_err(|failure| VmError::ClassParse {
                name: name.to_string(),
                failure,
            })?;

            return self.link(name, class_file);
        }

        if let Some(static_fields) = self.host_classes.get(name).cloned() {
            return self.link_host(name, static_fields);
        }

        Err(VmError::ClassNotFound(name.to_string()))
    }

    fn enter(&mut self, name: &str) -> Result<(), VmError> {
        if !self.resolving.insert(name.to_string()) {
            return Err(VmError::CyclicHierarchy(name.to_string()));
        }

        Ok(())
    }

    /// Link a parsed class: superclass and interfaces first, then shift instance field
    /// offsets past the inherited ones and register it.
    pub fn link(&mut self, name: &str, class_file: ClassFile) -> Result<Rc<LoadedClass>, VmError> {
        self.enter(name)?;
        let linked = self.link_inner(name, class_file);
        self.resolving.remove(name);

        let class = Rc::new(linked?);
        self.register(Rc::clone(&class));
        Ok(class)
    }

    fn link_inner(&mut self, name: &str, class_file: ClassFile) -> Result<LoadedClass, VmError> {
        let super_class = match class_file.super_class_name()? {
            Some(super_name) => Some(self.resolve_class(&super_name)?),
            None => None,
        };

        let interfaces = class_file
            .interface_names()?
            .iter()
            .map(|interface| self.resolve_class(interface))
            .collect::<Result<Vec<_>, _>>()?;

        let inherited = super_class
            .as_ref()
            .map(|s| s.instance_field_count)
            .unwrap_or(0);

        let mut fields = Vec::with_capacity(class_file.fields.len());
        for (index, field) in class_file.fields.iter().enumerate() {
            let descriptor = field.try_descriptor()?;
            let is_static = field.flags.is_static();

            fields.push(LoadedField {
                name: field.try_name()?,
                ty: FieldType::parse(&descriptor)?,
                descriptor,
                is_static,
                offset: if is_static {
                    field.offset
                } else {
                    field.offset.checked_add(inherited).ok_or_else(|| {
                        crate::internal!("{} needs more than {} instance slots", name, u16::MAX)
                    })?
                },
                source_index: Some(index),
            });
        }

        let mut methods = Vec::with_capacity(class_file.methods.len());
        for method in class_file.methods.iter() {
            let descriptor = method.try_descriptor()?;

            methods.push(Rc::new(LoadedMethod {
                name: method.try_name()?,
                ty: MethodType::parse(&descriptor)?,
                descriptor,
                flags: method.flags,
                code: method.code(&class_file.constant_pool)?,
            }));
        }

        let instance_field_count = class_file
            .instance_field_count
            .checked_add(inherited)
            .ok_or_else(|| {
                crate::internal!("{} needs more than {} instance slots", name, u16::MAX)
            })?;

        Ok(LoadedClass {
            name: name.to_string(),
            static_field_count: class_file.static_field_count,
            instance_field_count,
            class_file: Some(class_file),
            super_class,
            interfaces,
            fields,
            methods,
            init_state: RwLock::new(InitState::Uninitialised),
            static_data: RwLock::new(vec![]),
        })
    }

    fn link_host(
        &mut self,
        name: &str,
        static_fields: Vec<FieldDescriptor>,
    ) -> Result<Rc<LoadedClass>, VmError> {
        self.enter(name)?;

        let super_class = if name == JAVA_LANG_OBJECT {
            Ok(None)
        } else {
            self.resolve_class(JAVA_LANG_OBJECT).map(Some)
        };
        self.resolving.remove(name);
        let super_class = super_class?;

        let mut offset = 0;
        let fields = static_fields
            .into_iter()
            .map(|field| {
                let loaded = LoadedField {
                    name: field.name().to_string(),
                    descriptor: field.descriptor().to_string(),
                    ty: field.descriptor().clone(),
                    is_static: true,
                    offset,
                    source_index: None,
                };
                offset += loaded.slots() as u16;
                loaded
            })
            .collect();

        let class = Rc::new(LoadedClass {
            name: name.to_string(),
            class_file: None,
            instance_field_count: super_class
                .as_ref()
                .map(|s| s.instance_field_count)
                .unwrap_or(0),
            super_class,
            interfaces: vec![],
            fields,
            methods: vec![],
            static_field_count: offset,
            init_state: RwLock::new(InitState::Uninitialised),
            static_data: RwLock::new(vec![]),
        });

        self.register(Rc::clone(&class));
        Ok(class)
    }

    fn register(&mut self, class: Rc<LoadedClass>) {
        debug!("Registered class {}", class.name);
        self.load_order.push(class.name.clone());
        self.classes.insert(class.name.clone(), class);
    }

    /// Find a method on `class` or its superclasses. Classes named in the descriptor are
    /// resolved too.
    pub fn resolve_method(
        &mut self,
        class: &Rc<LoadedClass>,
        name: &str,
        descriptor: &str,
    ) -> Result<(Rc<LoadedClass>, Rc<LoadedMethod>), VmError> {
        let not_found = || VmError::MethodResolution {
            class_name: class.name.clone(),
            method: format!("{}{}", name, descriptor),
        };

        let ty = MethodType::parse(descriptor).map_err(|_| not_found())?;
        for referenced in ty
            .parameters
            .iter()
            .chain(std::iter::once(&ty.return_type))
            .filter_map(FieldType::referenced_class)
        {
            self.resolve_class(referenced).map_err(|_| not_found())?;
        }

        let mut current = Some(Rc::clone(class));
        while let Some(candidate) = current {
            if let Some(method) = candidate.method(name, descriptor) {
                return Ok((candidate, method));
            }

            current = candidate.super_class.clone();
        }

        Err(not_found())
    }

    /// Find a field on `class` or its superclasses, returning the declaring class.
    pub fn resolve_field(
        &mut self,
        class: &Rc<LoadedClass>,
        name: &str,
        descriptor: &str,
    ) -> Result<(Rc<LoadedClass>, LoadedField), VmError> {
        let not_found = || VmError::FieldResolution {
            class_name: class.name.clone(),
            field: format!("{}:{}", name, descriptor),
        };

        let ty = FieldType::parse(descriptor).map_err(|_| not_found())?;
        if let Some(referenced) = ty.referenced_class() {
            self.resolve_class(referenced).map_err(|_| not_found())?;
        }

        let mut current = Some(Rc::clone(class));
        while let Some(candidate) = current {
            if let Some(field) = candidate.field(name, descriptor) {
                return Ok((Rc::clone(&candidate), field.clone()));
            }

            current = candidate.super_class.clone();
        }

        Err(not_found())
    }
}
