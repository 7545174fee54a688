pub use crossforge_derive::ObjectTraversal;

/// Visits every string embedded in a manifest object so template
/// placeholders can be rewritten in place.
pub trait ObjectTraversal {
    fn traverse<T: ObjectWalker>(&mut self, walker: &mut T);
}

pub trait ObjectWalker {
    fn enter_string(&mut self, value: &mut String);
}

impl<T: ObjectTraversal> ObjectTraversal for Vec<T> {
    fn traverse<W: ObjectWalker>(&mut self, walker: &mut W) {
        for item in self {
            item.traverse(walker);
        }
    }
}

impl<T: ObjectTraversal> ObjectTraversal for Option<T> {
    fn traverse<W: ObjectWalker>(&mut self, walker: &mut W) {
        if let Some(v) = self {
            v.traverse(walker);
        }
    }
}

impl ObjectTraversal for String {
    fn traverse<W: ObjectWalker>(&mut self, walker: &mut W) {
        walker.enter_string(self);
    }
}

impl ObjectTraversal for bool {
    fn traverse<T: ObjectWalker>(&mut self, _: &mut T) {}
}

impl ObjectTraversal for usize {
    fn traverse<T: ObjectWalker>(&mut self, _: &mut T) {}
}

impl ObjectTraversal for u32 {
    fn traverse<T: ObjectWalker>(&mut self, _: &mut T) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Upper;

    impl ObjectWalker for Upper {
        fn enter_string(&mut self, value: &mut String) {
            *value = value.to_uppercase();
        }
    }

    #[test]
    fn walks_nested_containers() {
        let mut data = vec![Some("abc".to_string()), None, Some("def".to_string())];
        data.traverse(&mut Upper);
        assert_eq!(
            data,
            vec![Some("ABC".to_string()), None, Some("DEF".to_string())]
        );
    }
}
