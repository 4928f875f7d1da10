use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub start: usize,
    pub end: usize,
    pub line: usize,
    pub column: usize,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TokenKind<'a> {
    Identifier(&'a str),
    Integer(i64),
    Float(f64),
    /// Raw string contents between the quotes; escapes are still encoded.
    String(&'a str),
    True,
    False,

    // Type keywords
    Int,
    Long,
    FloatType,
    StringType,
    Boolean,
    Array,
    Matrix,
    Void,

    // Keywords
    If,
    Else,
    While,
    For,
    Repeat,
    Times,
    Function,
    Return,
    End,
    Print,
    Input,
    Break,
    Continue,
    And,
    Or,
    Not,

    // Operators
    Assign,       // =
    EqualEqual,   // ==
    NotEqual,     // !=
    Less,         // <
    LessEqual,    // <=
    Greater,      // >
    GreaterEqual, // >=
    Plus,         // +
    Minus,        // -
    Star,         // *
    Slash,        // /
    Percent,      // %
    Caret,        // ^

    // Delimiters
    Colon,     // :
    Semicolon, // ;
    Comma,     // ,
    LParen,    // (
    RParen,    // )
    LBracket,  // [
    RBracket,  // ]

    // Structural
    Newline,
    EOF,
}

impl TokenKind<'_> {
    pub fn keyword(ident: &str) -> Option<TokenKind<'static>> {
        let kind = match ident {
            "int" => TokenKind::Int,
            "long" => TokenKind::Long,
            "float" => TokenKind::FloatType,
            "string" => TokenKind::StringType,
            "boolean" => TokenKind::Boolean,
            "array" => TokenKind::Array,
            "matrix" => TokenKind::Matrix,
            "void" => TokenKind::Void,
            "if" => TokenKind::If,
            "else" => TokenKind::Else,
            "while" => TokenKind::While,
            "for" => TokenKind::For,
            "repeat" => TokenKind::Repeat,
            "times" => TokenKind::Times,
            "function" => TokenKind::Function,
            "return" => TokenKind::Return,
            "end" => TokenKind::End,
            "print" => TokenKind::Print,
            "input" => TokenKind::Input,
            "break" => TokenKind::Break,
            "continue" => TokenKind::Continue,
            "and" => TokenKind::And,
            "or" => TokenKind::Or,
            "not" => TokenKind::Not,
            "true" => TokenKind::True,
            "false" => TokenKind::False,
            _ => return None,
        };
        Some(kind)
    }

    pub fn is_type_keyword(&self) -> bool {
        matches!(
            self,
            TokenKind::Int
                | TokenKind::Long
                | TokenKind::FloatType
                | TokenKind::StringType
                | TokenKind::Boolean
                | TokenKind::Array
                | TokenKind::Matrix
                | TokenKind::Void
        )
    }

    /// Tokens that can only begin a statement; the parser resynchronizes on them.
    pub fn starts_statement(&self) -> bool {
        self.is_type_keyword()
            || matches!(
                self,
                TokenKind::If
                    | TokenKind::While
                    | TokenKind::For
                    | TokenKind::Repeat
                    | TokenKind::Function
                    | TokenKind::Return
                    | TokenKind::Print
                    | TokenKind::Input
                    | TokenKind::Break
                    | TokenKind::Continue
            )
    }
}

impl fmt::Display for TokenKind<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            TokenKind::Identifier(name) => return write!(f, "identifier '{name}'"),
            TokenKind::Integer(value) => return write!(f, "integer {value}"),
            TokenKind::Float(value) => return write!(f, "float {value}"),
            TokenKind::String(value) => return write!(f, "string \"{value}\""),
            TokenKind::True => "'true'",
            TokenKind::False => "'false'",
            TokenKind::Int => "'int'",
            TokenKind::Long => "'long'",
            TokenKind::FloatType => "'float'",
            TokenKind::StringType => "'string'",
            TokenKind::Boolean => "'boolean'",
            TokenKind::Array => "'array'",
            TokenKind::Matrix => "'matrix'",
            TokenKind::Void => "'void'",
            TokenKind::If => "'if'",
            TokenKind::Else => "'else'",
            TokenKind::While => "'while'",
            TokenKind::For => "'for'",
            TokenKind::Repeat => "'repeat'",
            TokenKind::Times => "'times'",
            TokenKind::Function => "'function'",
            TokenKind::Return => "'return'",
            TokenKind::End => "'end'",
            TokenKind::Print => "'print'",
            TokenKind::Input => "'input'",
            TokenKind::Break => "'break'",
            TokenKind::Continue => "'continue'",
            TokenKind::And => "'and'",
            TokenKind::Or => "'or'",
            TokenKind::Not => "'not'",
            TokenKind::Assign => "'='",
            TokenKind::EqualEqual => "'=='",
            TokenKind::NotEqual => "'!='",
            TokenKind::Less => "'<'",
            TokenKind::LessEqual => "'<='",
            TokenKind::Greater => "'>'",
            TokenKind::GreaterEqual => "'>='",
            TokenKind::Plus => "'+'",
            TokenKind::Minus => "'-'",
            TokenKind::Star => "'*'",
            TokenKind::Slash => "'/'",
            TokenKind::Percent => "'%'",
            TokenKind::Caret => "'^'",
            TokenKind::Colon => "':'",
            TokenKind::Semicolon => "';'",
            TokenKind::Comma => "','",
            TokenKind::LParen => "'('",
            TokenKind::RParen => "')'",
            TokenKind::LBracket => "'['",
            TokenKind::RBracket => "']'",
            TokenKind::Newline => "end of line",
            TokenKind::EOF => "end of input",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token<'a> {
    pub kind: TokenKind<'a>,
    pub span: Span,
}

impl<'a> Token<'a> {
    pub fn new(kind: TokenKind<'a>, span: Span) -> Self {
        Self { kind, span }
    }

    pub fn kind(&self) -> &TokenKind<'a> {
        &self.kind
    }

    pub fn span(&self) -> Span {
        self.span
    }
}
