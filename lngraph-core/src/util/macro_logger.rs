/// Return a shortened version of the function name.
#[macro_export]
macro_rules! short_function {
    () => {{
        fn f() {}
        fn type_name_of<T>(_: T) -> &'static str {
            core::any::type_name::<T>()
        }
        let name = type_name_of(f);

        // Find and cut the rest of the path
        match &name[..name.len() - 3].rfind(':') {
            Some(pos) => &name[pos + 1..name.len() - 3],
            None => &name[..name.len() - 3],
        }
    }};
}

/// Render a list of change records on one line, for debug logging.
#[macro_export]
macro_rules! changes_str {
    ($changes: expr) => {{
        use itertools::Itertools;
        $changes.iter().map(|c| format!("{}", c)).join(", ")
    }};
}

#[cfg(test)]
mod tests {
    #[test]
    fn short_function_test() {
        assert_eq!(short_function!(), "short_function_test");
    }
}
