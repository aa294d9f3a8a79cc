use crate::class_file::VerificationType;
use crate::descriptors::{BaseType, FieldType};
use std::collections::{HashMap, HashSet};

/// Abstract value tracked for each local and stack entry during frame computation
///
/// Uninitialized objects are identified by the index of their `new` instruction.
pub type Value = VerificationType<String, usize>;

pub const OBJECT_NAME: &str = "java/lang/Object";
pub const THROWABLE_NAME: &str = "java/lang/Throwable";
pub const STRING_NAME: &str = "java/lang/String";
pub const CLASS_NAME: &str = "java/lang/Class";
pub const METHOD_TYPE_NAME: &str = "java/lang/invoke/MethodType";
pub const METHOD_HANDLE_NAME: &str = "java/lang/invoke/MethodHandle";

/// Answers subtyping questions that come up when merging frames
///
/// The analysis never loads classes itself: whatever knows about the classes involved (a class
/// path, a set of classes being generated together) should implement this.
pub trait TypeHierarchy {
    /// Most specific common superclass of two classes, by internal name
    fn common_super_class(&self, class1: &str, class2: &str) -> String;
}

/// Hierarchy that knows nothing, so every pair of distinct classes merges to `java/lang/Object`
#[derive(Debug, Default, Clone, Copy)]
pub struct ObjectHierarchy;

impl TypeHierarchy for ObjectHierarchy {
    fn common_super_class(&self, class1: &str, class2: &str) -> String {
        if class1 == class2 {
            class1.to_owned()
        } else {
            OBJECT_NAME.to_owned()
        }
    }
}

/// Hierarchy built from explicitly registered classes
///
/// Classes which aren't registered are assumed to extend `java/lang/Object` directly.
#[derive(Debug, Default, Clone)]
pub struct ClassHierarchy {
    classes: HashMap<String, ClassData>,
}

#[derive(Debug, Clone)]
struct ClassData {
    superclass: Option<String>,
    is_interface: bool,
}

impl ClassHierarchy {
    pub fn new() -> ClassHierarchy {
        ClassHierarchy::default()
    }

    pub fn add_class(&mut self, name: impl Into<String>, superclass: Option<String>) {
        self.classes.insert(
            name.into(),
            ClassData {
                superclass,
                is_interface: false,
            },
        );
    }

    pub fn add_interface(&mut self, name: impl Into<String>) {
        self.classes.insert(
            name.into(),
            ClassData {
                superclass: Some(OBJECT_NAME.to_owned()),
                is_interface: true,
            },
        );
    }

    fn is_interface(&self, name: &str) -> bool {
        self.classes.get(name).map_or(false, |data| data.is_interface)
    }

    /// The class followed by all of its superclasses
    fn superclass_chain<'a>(&'a self, name: &'a str) -> Vec<&'a str> {
        let mut chain = vec![name];
        let mut seen: HashSet<&str> = chain.iter().copied().collect();
        let mut current = name;
        while let Some(superclass) = self
            .classes
            .get(current)
            .and_then(|data| data.superclass.as_deref())
        {
            if !seen.insert(superclass) {
                break;
            }
            chain.push(superclass);
            current = superclass;
        }
        chain
    }
}

impl TypeHierarchy for ClassHierarchy {
    fn common_super_class(&self, class1: &str, class2: &str) -> String {
        if class1 == class2 {
            return class1.to_owned();
        }
        if self.is_interface(class1) || self.is_interface(class2) {
            return OBJECT_NAME.to_owned();
        }
        let ancestors: HashSet<&str> = self.superclass_chain(class1).into_iter().collect();
        self.superclass_chain(class2)
            .into_iter()
            .find(|class| ancestors.contains(class))
            .unwrap_or(OBJECT_NAME)
            .to_owned()
    }
}

/// Value of a local or stack entry holding something of the given type
pub fn value_of(field_type: &FieldType) -> Value {
    match field_type {
        FieldType::Base(BaseType::Long) => VerificationType::Long,
        FieldType::Base(BaseType::Double) => VerificationType::Double,
        FieldType::Base(BaseType::Float) => VerificationType::Float,
        FieldType::Base(_) => VerificationType::Integer,
        FieldType::Ref(ref_type) => VerificationType::Object(ref_type.internal_name()),
    }
}

/// Least upper bound of two values, or `None` if they can't be reconciled
///
/// `Top` absorbs everything, so merging anything into `Top` is not a conflict.
pub fn merge_values(value1: &Value, value2: &Value, hierarchy: &dyn TypeHierarchy) -> Option<Value> {
    use VerificationType::*;

    match (value1, value2) {
        (v1, v2) if v1 == v2 => Some(v1.clone()),
        (Top, _) | (_, Top) => Some(Top),
        (Null, Object(name)) | (Object(name), Null) => Some(Object(name.clone())),
        (Object(name1), Object(name2)) => Some(Object(merge_classes(name1, name2, hierarchy))),
        _ => None,
    }
}

fn merge_classes(name1: &str, name2: &str, hierarchy: &dyn TypeHierarchy) -> String {
    match (name1.strip_prefix('['), name2.strip_prefix('[')) {
        // Arrays of references are covariant
        (Some(elem1), Some(elem2)) => {
            match (reference_element(elem1), reference_element(elem2)) {
                (Some(class1), Some(class2)) => {
                    let merged = merge_classes(class1, class2, hierarchy);
                    if merged.starts_with('[') {
                        format!("[{}", merged)
                    } else {
                        format!("[L{};", merged)
                    }
                }
                _ => OBJECT_NAME.to_owned(),
            }
        }
        (None, None) => hierarchy.common_super_class(name1, name2),
        _ => OBJECT_NAME.to_owned(),
    }
}

/// Internal name of an array element type, if it is a reference type
fn reference_element(element_descriptor: &str) -> Option<&str> {
    if element_descriptor.starts_with('[') {
        Some(element_descriptor)
    } else {
        element_descriptor
            .strip_prefix('L')
            .and_then(|rest| rest.strip_suffix(';'))
    }
}

/// Value of an element loaded out of an array of the given type
pub fn array_element(array: &Value) -> Value {
    match array {
        VerificationType::Object(name) => match name.strip_prefix('[').and_then(reference_element)
        {
            Some(element) => VerificationType::Object(element.to_owned()),
            None => VerificationType::Top,
        },
        VerificationType::Null => VerificationType::Null,
        _ => VerificationType::Top,
    }
}

/// Array type with elements of the given class (internal name or array descriptor)
pub fn array_of(class: &str) -> String {
    if class.starts_with('[') {
        format!("[{}", class)
    } else {
        format!("[L{};", class)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn object(name: &str) -> Value {
        VerificationType::Object(name.to_owned())
    }

    #[test]
    fn merges() {
        let hierarchy = ObjectHierarchy;
        assert_eq!(
            merge_values(&VerificationType::Null, &object("A"), &hierarchy),
            Some(object("A"))
        );
        assert_eq!(
            merge_values(&object("A"), &object("B"), &hierarchy),
            Some(object(OBJECT_NAME))
        );
        assert_eq!(
            merge_values(&VerificationType::Integer, &VerificationType::Top, &hierarchy),
            Some(VerificationType::Top)
        );
        assert_eq!(
            merge_values(&VerificationType::Integer, &VerificationType::Float, &hierarchy),
            None
        );
        assert_eq!(
            merge_values(&object("[LA;"), &object("[LB;"), &hierarchy),
            Some(object("[Ljava/lang/Object;"))
        );
        assert_eq!(
            merge_values(&object("[I"), &object("[J"), &hierarchy),
            Some(object(OBJECT_NAME))
        );
    }

    #[test]
    fn registered_hierarchy() {
        let mut hierarchy = ClassHierarchy::new();
        hierarchy.add_class("Animal", Some(OBJECT_NAME.to_owned()));
        hierarchy.add_class("Dog", Some("Animal".to_owned()));
        hierarchy.add_class("Cat", Some("Animal".to_owned()));
        hierarchy.add_interface("Pet");

        assert_eq!(hierarchy.common_super_class("Dog", "Cat"), "Animal");
        assert_eq!(hierarchy.common_super_class("Dog", "Animal"), "Animal");
        assert_eq!(hierarchy.common_super_class("Dog", "Pet"), OBJECT_NAME);
        assert_eq!(hierarchy.common_super_class("Dog", "Unknown"), OBJECT_NAME);
    }

    #[test]
    fn array_elements() {
        assert_eq!(array_element(&object("[[I")), object("[I"));
        assert_eq!(array_element(&object("[LA;")), object("A"));
        assert_eq!(array_of("A"), "[LA;");
        assert_eq!(array_of("[I"), "[[I");
    }
}
