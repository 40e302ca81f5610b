use std::fmt;

/// Strings every program gets, whether or not it uses them.
pub const FIXED_STRINGS: &[(&str, &str)] = &[
    ("str_true", "true"),
    ("str_false", "false"),
    ("str_empty", ""),
    ("str_comma", ","),
    ("err_div_zero", "error: division by zero\\n"),
    ("err_bounds", "error: index out of bounds\\n"),
];

/// A statically sized array: one length word followed by its elements.
#[derive(Debug, Clone, PartialEq)]
pub struct StaticArray {
    pub label: String,
    pub length: usize,
}

/// The `.data` section: fixed strings, array regions, then the heap start.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataSection {
    arrays: Vec<StaticArray>,
}

impl DataSection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve a region for `length` words and return its label. The label
    /// addresses the length header; element 0 sits one word after it.
    pub fn allocate_array(&mut self, length: usize) -> String {
        let label = format!("arr_{}", self.arrays.len());
        self.arrays.push(StaticArray {
            label: label.clone(),
            length,
        });
        label
    }

    pub fn arrays(&self) -> &[StaticArray] {
        &self.arrays
    }
}

impl fmt::Display for DataSection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, ".data")?;
        for (label, text) in FIXED_STRINGS {
            writeln!(f, "{}: .asciz \"{}\"", label, text)?;
        }
        writeln!(f, ".align 2")?;
        for array in &self.arrays {
            write!(f, "{}: .word {}", array.label, array.length)?;
            if array.length > 0 {
                write!(f, "\n    .space {}", array.length * 4)?;
            }
            writeln!(f)?;
        }
        write!(f, "heap:")
    }
}
