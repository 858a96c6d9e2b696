use flex_error::define_error;

define_error! {
    ValidationError {
        ContainSeparator
            { id: String }
            |e| { format!("identifier {} cannot contain separator '/'", e.id) },

        InvalidLength
            { id: String, length: usize, min: usize, max: usize }
            |e| {
                format!("identifier {} has invalid length {} must be between {}-{} characters",
                    e.id, e.length, e.min, e.max)
            },

        InvalidCharacter
            { id: String }
            |e| {
                format!("identifier {} must only contain alphanumeric characters or `.`, `_`, `+`, `-`, `#`, - `[`, `]`, `<`, `>`",
                    e.id)
            },

        Empty
            |_| { "identifier cannot be empty" },

        InvalidHeight
            { height: String }
            |e| { format!("cannot parse height '{}', expected '{{revision}}-{{height}}'", e.height) },

        InvalidOrder
            { order: String }
            |e| { format!("invalid channel ordering '{}', expected 'ordered' or 'unordered'", e.order) },
    }
}
