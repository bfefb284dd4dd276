use std::collections::HashMap;

use rand::Rng;

const LETTERS: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";
const ALPHANUMERIC: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

const FRESH_DRAWS: usize = 1000;

const C_KEYWORDS: &[&str] = &[
    "asm", "auto", "bool", "break", "case", "char", "const", "continue", "default", "do",
    "double", "else", "enum", "extern", "false", "float", "for", "goto", "if", "inline", "int",
    "long", "register", "restrict", "return", "short", "signed", "sizeof", "static", "struct",
    "switch", "true", "typedef", "union", "unsigned", "void", "volatile", "while",
];

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Symbol(usize);

/// Every identifier handed out for one program. Fresh names never collide
/// with an earlier one or with a C keyword.
#[derive(Debug, Default)]
pub struct SymbolTable {
    symbols: Vec<String>,
    string_to_symbol: HashMap<String, Symbol>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self {
            symbols: Vec::new(),
            string_to_symbol: HashMap::new(),
        }
    }

    pub fn insert(&mut self, s: String) -> Symbol {
        let i = self.symbols.len();
        self.string_to_symbol.insert(s.clone(), Symbol(i));
        self.symbols.push(s);
        Symbol(i)
    }

    pub fn to_sym(&mut self, name: &str) -> Symbol {
        match self.lookup(name) {
            Some(s) => s,
            None => self.insert(String::from(name)),
        }
    }

    pub fn from_sym(&self, sym: Symbol) -> &str {
        &self.symbols[sym.0]
    }

    pub fn lookup(&self, s: &str) -> Option<Symbol> {
        self.string_to_symbol.get(s).copied()
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// Draw random names of `length` characters until one is unused. After
    /// `FRESH_DRAWS` collisions the name grows by one character, so a
    /// crowded name space still yields a name.
    pub fn fresh<R: Rng + ?Sized>(&mut self, rng: &mut R, length: usize) -> Symbol {
        assert!(length > 0, "identifiers need at least one character");
        let mut length = length;
        loop {
            for _ in 0..FRESH_DRAWS {
                let candidate = random_identifier(rng, length);
                if self.lookup(&candidate).is_none()
                    && !C_KEYWORDS.contains(&candidate.as_str())
                {
                    return self.insert(candidate);
                }
            }
            length += 1;
        }
    }
}

fn random_identifier<R: Rng + ?Sized>(rng: &mut R, length: usize) -> String {
    let mut s = String::with_capacity(length);
    s.push(LETTERS[rng.random_range(0..LETTERS.len())] as char);
    for _ in 1..length {
        s.push(ALPHANUMERIC[rng.random_range(0..ALPHANUMERIC.len())] as char);
    }
    s
}
