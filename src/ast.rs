use core::fmt;

/// A parsed configuration body: the generic tree handed from stage to stage.
///
/// Attribute values are kept as unevaluated [`Expression`]s. A stage decodes
/// the parts of a body it knows about and passes everything else on as a
/// [`Body`] remainder for a later stage.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Body {
    pub attributes: Vec<Attribute>,
    pub blocks: Vec<Block>,
}

impl Body {
    pub fn new(attributes: Vec<Attribute>, blocks: Vec<Block>) -> Self {
        Self { attributes, blocks }
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty() && self.blocks.is_empty()
    }

    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.name == name)
    }

    pub fn blocks_of<'a>(&'a self, kind: &'a str) -> impl Iterator<Item = &'a Block> + 'a {
        self.blocks.iter().filter(move |b| b.kind == kind)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    pub name: String,
    pub expr: Expression,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub kind: String,
    pub labels: Vec<String>,
    pub body: Body,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Integer(i64),
    Float(f64),
    String(String),
    Boolean(bool),
    Null,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TemplatePart {
    Text(String),
    Interpolation(Expression),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Literal(Literal),
    /// A quoted string containing at least one `${...}` interpolation.
    Template(Vec<TemplatePart>),
    Variable(String),
    GetAttr {
        target: Box<Expression>,
        name: String,
    },
    Index {
        target: Box<Expression>,
        key: Box<Expression>,
    },
    FunctionCall {
        function: String,
        arguments: Vec<Expression>,
    },
    List(Vec<Expression>),
    Object(Vec<(String, Expression)>),
}

impl Expression {
    pub fn string(s: impl Into<String>) -> Self {
        Expression::Literal(Literal::String(s.into()))
    }

    pub fn call(function: impl Into<String>, arguments: Vec<Expression>) -> Self {
        Expression::FunctionCall {
            function: function.into(),
            arguments,
        }
    }

    /// Visits every node of this expression, outermost first.
    pub fn walk<'a>(&'a self, f: &mut impl FnMut(&'a Expression)) {
        f(self);
        match self {
            Expression::Literal(_) | Expression::Variable(_) => {}
            Expression::Template(parts) => {
                for part in parts {
                    if let TemplatePart::Interpolation(expr) = part {
                        expr.walk(f);
                    }
                }
            }
            Expression::GetAttr { target, .. } => target.walk(f),
            Expression::Index { target, key } => {
                target.walk(f);
                key.walk(f);
            }
            Expression::FunctionCall { arguments, .. } => {
                arguments.iter().for_each(|arg| arg.walk(f))
            }
            Expression::List(items) => items.iter().for_each(|item| item.walk(f)),
            Expression::Object(items) => items.iter().for_each(|(_, v)| v.walk(f)),
        }
    }

    /// Every function call as `(name, arity)`.
    pub fn calls(&self) -> Vec<(&str, usize)> {
        let mut calls = vec![];
        self.walk(&mut |expr| {
            if let Expression::FunctionCall {
                function,
                arguments,
            } = expr
            {
                calls.push((function.as_str(), arguments.len()));
            }
        });
        calls
    }

    /// Every root variable referenced.
    pub fn variables(&self) -> Vec<&str> {
        let mut variables = vec![];
        self.walk(&mut |expr| {
            if let Expression::Variable(name) = expr {
                variables.push(name.as_str());
            }
        });
        variables
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Literal::Integer(i) => write!(f, "{}", i),
            Literal::Float(v) => write!(f, "{}", v),
            Literal::String(s) => write!(f, "{:?}", s),
            Literal::Boolean(b) => write!(f, "{}", b),
            Literal::Null => write!(f, "null"),
        }
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Expression::Literal(lit) => write!(f, "{}", lit),
            Expression::Template(parts) => {
                write!(f, "\"")?;
                for part in parts {
                    match part {
                        TemplatePart::Text(text) => write!(f, "{}", text.escape_debug())?,
                        TemplatePart::Interpolation(expr) => write!(f, "${{{}}}", expr)?,
                    }
                }
                write!(f, "\"")
            }
            Expression::Variable(name) => write!(f, "{}", name),
            Expression::GetAttr { target, name } => write!(f, "{}.{}", target, name),
            Expression::Index { target, key } => write!(f, "{}[{}]", target, key),
            Expression::FunctionCall {
                function,
                arguments,
            } => {
                write!(f, "{}(", function)?;
                for (i, arg) in arguments.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                write!(f, ")")
            }
            Expression::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Expression::Object(items) => {
                write!(f, "{{")?;
                for (i, (key, value)) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{:?} = {}", key, value)?;
                }
                write!(f, "}}")
            }
        }
    }
}
