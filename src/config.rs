/// Page sizes (in bytes) requested for each store, plus the intern table size.
///
/// Typed stores round their request up so that a page holds an integral
/// number of entries and is a multiple of the OS page size.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub cons_page_size: usize,
    pub symbol_page_size: usize,
    pub string_page_size: usize,
    pub closure_page_size: usize,
    pub primitive_page_size: usize,
    pub double_page_size: usize,
    /// Backing pages for symbol and string text.
    pub byte_page_size: usize,
    pub intern_buckets: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            cons_page_size: 1 << 20,
            symbol_page_size: 1 << 14,
            string_page_size: 1 << 14,
            closure_page_size: 1 << 16,
            primitive_page_size: 1 << 14,
            double_page_size: 1 << 16,
            byte_page_size: 1 << 21,
            intern_buckets: 4093,
        }
    }
}

#[derive(Debug, Clone)]
pub struct InterpreterConfig {
    pub store: StoreConfig,
    /// Upper bound on operands in a single application.
    pub max_operands: usize,
    /// Upper bound on pending continuations, i.e. nested non-tail evaluations.
    pub max_depth: usize,
}

pub const DEFAULT_MAX_OPERANDS: usize = 32;
pub const DEFAULT_MAX_DEPTH: usize = 1_000_000;

impl Default for InterpreterConfig {
    fn default() -> Self {
        InterpreterConfig {
            store: StoreConfig::default(),
            max_operands: DEFAULT_MAX_OPERANDS,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}
