use crate::class_file::{
    AttributeLike, ConstantValue, Exceptions, LineNumberTable, LocalVariableTable, StackMapTable,
};

/// Where a generated attribute goes when nothing marks its position
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// Ahead of the copied attributes
    Leading,

    /// After the copied attributes
    Trailing,
}

/// Attributes of a field, method, or `Code` attribute which writers regenerate from events
/// rather than copy, in their default order
#[derive(Debug, Clone, Copy)]
pub struct AttributeLayout {
    generated: &'static [(&'static str, Placement)],
}

impl AttributeLayout {
    pub const FIELD: AttributeLayout = AttributeLayout {
        generated: &[(ConstantValue::NAME, Placement::Leading)],
    };

    pub const METHOD: AttributeLayout = AttributeLayout {
        generated: &[
            ("Code", Placement::Leading),
            (Exceptions::NAME, Placement::Leading),
        ],
    };

    pub const CODE: AttributeLayout = AttributeLayout {
        generated: &[
            (LineNumberTable::NAME, Placement::Leading),
            (LocalVariableTable::NAME, Placement::Leading),
            (StackMapTable::NAME, Placement::Trailing),
        ],
    };

    /// Placement of a generated attribute, `None` for attributes that get copied
    pub fn placement(&self, name: &str) -> Option<Placement> {
        self.generated
            .iter()
            .find(|(generated, _)| *generated == name)
            .map(|(_, placement)| *placement)
    }

    pub fn generates(&self, name: &str) -> bool {
        self.placement(name).is_some()
    }

    /// Positions of the attributes named `names`, reordered into the default layout
    ///
    /// Copied attributes keep their relative order. Generated ones move ahead of them or after
    /// them, in layout order.
    pub fn default_order(&self, names: &[&str]) -> Vec<usize> {
        let copied = self.generated.len();
        let rank = |name: &str| -> usize {
            match self
                .generated
                .iter()
                .position(|(generated, _)| *generated == name)
            {
                Some(position) if self.generated[position].1 == Placement::Leading => position,
                Some(position) => copied + 1 + position,
                None => copied,
            }
        };
        let mut order: Vec<usize> = (0..names.len()).collect();
        order.sort_by_key(|idx| rank(names[*idx]));
        order
    }

    /// Are attributes with these names, in this order, already in the default layout?
    pub fn is_default_order(&self, names: &[&str]) -> bool {
        self.default_order(names).into_iter().eq(0..names.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_attributes_surround_copied_ones() {
        let names = [
            "StackMapTable",
            "Custom",
            "LocalVariableTable",
            "Other",
            "LineNumberTable",
        ];
        assert_eq!(AttributeLayout::CODE.default_order(&names), vec![4, 2, 1, 3, 0]);
        assert!(!AttributeLayout::CODE.is_default_order(&names));
        assert!(AttributeLayout::CODE.is_default_order(&[
            "LineNumberTable",
            "Custom",
            "StackMapTable"
        ]));
    }

    #[test]
    fn field_layout() {
        assert!(AttributeLayout::FIELD.is_default_order(&["ConstantValue", "Signature"]));
        assert!(!AttributeLayout::FIELD.is_default_order(&["Signature", "ConstantValue"]));
        assert!(AttributeLayout::FIELD.is_default_order(&[]));
        assert_eq!(
            AttributeLayout::METHOD.placement("Exceptions"),
            Some(Placement::Leading)
        );
        assert!(!AttributeLayout::METHOD.generates("Signature"));
    }
}
