//! IR Module - functions, basic blocks and globals

use crate::instruction::{Instruction, Value};
use crate::types::IrType;
use std::collections::{HashMap, HashSet};
use std::fmt;

/// A complete compilation unit
#[derive(Debug, Default)]
pub struct Module {
    pub name: String,
    /// Functions in definition order
    pub functions: Vec<Function>,
    pub globals: Vec<Global>,
}

impl Module {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn add_function(&mut self, func: Function) {
        self.functions.push(func);
    }

    pub fn get_function(&self, name: &str) -> Option<&Function> {
        self.functions.iter().find(|f| f.name == name)
    }

    pub fn get_function_mut(&mut self, name: &str) -> Option<&mut Function> {
        self.functions.iter_mut().find(|f| f.name == name)
    }

    /// Erases a function, returning it if it existed
    pub fn remove_function(&mut self, name: &str) -> Option<Function> {
        let index = self.functions.iter().position(|f| f.name == name)?;
        Some(self.functions.remove(index))
    }

    pub fn add_global(&mut self, global: Global) {
        self.globals.push(global);
    }

    pub fn get_global(&self, name: &str) -> Option<&Global> {
        self.globals.iter().find(|g| g.name == name)
    }

    /// Whether `name` is taken by a function or a global
    pub fn has_symbol(&self, name: &str) -> bool {
        self.get_function(name).is_some() || self.get_global(name).is_some()
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "; ModuleID = '{}'", self.name)?;

        if !self.globals.is_empty() {
            writeln!(f)?;
            for global in &self.globals {
                writeln!(f, "{}", global)?;
            }
        }

        for func in &self.functions {
            writeln!(f)?;
            write!(f, "{}", func)?;
        }
        Ok(())
    }
}

/// Index of a block inside its function's block arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockId(pub(crate) usize);

/// Function - a declaration when it has no attached blocks
#[derive(Debug)]
pub struct Function {
    pub name: String,
    /// Parameter names (unique within the function); all parameters are `f64`
    pub params: Vec<String>,
    /// Every block ever created, attached or not
    blocks: Vec<BasicBlock>,
    /// Attached blocks in layout order; the first is the entry block
    layout: Vec<BlockId>,
    /// Type of each temporary, indexed by its number
    temps: Vec<IrType>,
    taken_names: HashSet<String>,
    name_suffixes: HashMap<String, u32>,
}

impl Function {
    pub fn new(name: impl Into<String>, params: &[String]) -> Self {
        let mut func = Self {
            name: name.into(),
            params: Vec::with_capacity(params.len()),
            blocks: Vec::new(),
            layout: Vec::new(),
            temps: Vec::new(),
            taken_names: HashSet::new(),
            name_suffixes: HashMap::new(),
        };
        for param in params {
            let unique = func.unique_name(param);
            func.params.push(unique);
        }
        func
    }

    pub fn is_declaration(&self) -> bool {
        self.layout.is_empty()
    }

    pub fn arity(&self) -> usize {
        self.params.len()
    }

    pub fn param_value(&self, index: usize) -> Option<Value> {
        self.params.get(index).map(|name| Value::Param {
            index,
            name: name.clone(),
        })
    }

    /// Makes `base` unique among this function's value and block names:
    /// `x`, then `x1`, `x2`, ...
    pub fn unique_name(&mut self, base: &str) -> String {
        if self.taken_names.insert(base.to_string()) {
            return base.to_string();
        }
        loop {
            let suffix = self.name_suffixes.entry(base.to_string()).or_insert(0);
            *suffix += 1;
            let candidate = format!("{}{}", base, suffix);
            if self.taken_names.insert(candidate.clone()) {
                return candidate;
            }
        }
    }

    /// Allocates a new temporary of type `ty`
    pub fn new_temp(&mut self, ty: IrType) -> u32 {
        self.temps.push(ty);
        (self.temps.len() - 1) as u32
    }

    pub fn temp_type(&self, id: u32) -> Option<IrType> {
        self.temps.get(id as usize).copied()
    }

    pub fn temp_count(&self) -> usize {
        self.temps.len()
    }

    /// Creates a block that is not yet part of the layout
    pub fn create_block(&mut self, label: &str) -> BlockId {
        let label = self.unique_name(label);
        self.blocks.push(BasicBlock::new(label));
        BlockId(self.blocks.len() - 1)
    }

    /// Appends a detached block to the layout. Returns false if it was already attached.
    pub fn attach_block(&mut self, id: BlockId) -> bool {
        if self.layout.contains(&id) || id.0 >= self.blocks.len() {
            return false;
        }
        self.layout.push(id);
        true
    }

    pub fn is_attached(&self, id: BlockId) -> bool {
        self.layout.contains(&id)
    }

    pub fn block(&self, id: BlockId) -> Option<&BasicBlock> {
        self.blocks.get(id.0)
    }

    pub fn block_mut(&mut self, id: BlockId) -> Option<&mut BasicBlock> {
        self.blocks.get_mut(id.0)
    }

    pub fn entry(&self) -> Option<BlockId> {
        self.layout.first().copied()
    }

    /// Attached blocks in layout order
    pub fn blocks(&self) -> impl Iterator<Item = &BasicBlock> {
        self.layout.iter().map(move |id| &self.blocks[id.0])
    }

    /// Finds an attached block by label
    pub fn get_block(&self, label: &str) -> Option<&BasicBlock> {
        self.blocks().find(|b| b.label == label)
    }

    fn write_signature(&self, f: &mut fmt::Formatter<'_>, keyword: &str) -> fmt::Result {
        write!(f, "{} {} @{}(", keyword, IrType::F64, self.name)?;
        for (i, param) in self.params.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{} %{}", IrType::F64, param)?;
        }
        write!(f, ")")
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_declaration() {
            self.write_signature(f, "declare")?;
            return writeln!(f);
        }

        self.write_signature(f, "define")?;
        writeln!(f, " {{")?;
        for (i, block) in self.blocks().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            writeln!(f, "{}:", block.label)?;
            for inst in &block.instructions {
                writeln!(f, "  {}", inst)?;
            }
        }
        writeln!(f, "}}")
    }
}

/// Basic Block - straight-line code ending in one terminator
#[derive(Debug)]
pub struct BasicBlock {
    pub label: String,
    pub instructions: Vec<Instruction>,
}

impl BasicBlock {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            instructions: Vec::new(),
        }
    }

    pub fn is_terminated(&self) -> bool {
        self.instructions
            .last()
            .map(Instruction::is_terminator)
            .unwrap_or(false)
    }

    pub fn terminator(&self) -> Option<&Instruction> {
        self.instructions.last().filter(|i| i.is_terminator())
    }
}

/// A zero-initialized module-level `f64`
#[derive(Debug, Clone, PartialEq)]
pub struct Global {
    pub name: String,
    pub ty: IrType,
    pub initializer: f64,
}

impl Global {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ty: IrType::F64,
            initializer: 0.0,
        }
    }
}

impl fmt::Display for Global {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "@{} = common global {} {:?}",
            self.name, self.ty, self.initializer
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_unique_names() {
        let mut func = Function::new("f", &["x".to_string(), "x".to_string()]);
        assert_eq!(func.params, vec!["x", "x1"]);
        assert_eq!(func.unique_name("x"), "x2");
        assert_eq!(func.unique_name("cond"), "cond");
        assert_eq!(func.unique_name("cond"), "cond1");
    }

    #[test]
    fn test_detached_blocks_are_not_printed() {
        let mut func = Function::new("f", &[]);
        let entry = func.create_block("entry");
        let orphan = func.create_block("falseexp");
        assert!(func.is_declaration());
        assert!(func.attach_block(entry));
        assert!(!func.attach_block(entry));
        func.block_mut(entry)
            .unwrap()
            .instructions
            .push(Instruction::Return(Value::const_float(1.0)));

        assert!(!func.is_attached(orphan));
        assert_eq!(func.to_string(), "define f64 @f() {\nentry:\n  ret 1.0\n}\n");
    }

    #[test]
    fn test_module_display() {
        let mut module = Module::new("demo");
        module.add_global(Global::new("g"));
        module.add_function(Function::new("sin", &["x".to_string()]));

        assert_eq!(
            module.to_string(),
            "; ModuleID = 'demo'\n\n@g = common global f64 0.0\n\ndeclare f64 @sin(f64 %x)\n"
        );
        assert!(module.has_symbol("g"));
        assert!(module.remove_function("sin").is_some());
        assert!(!module.has_symbol("sin"));
    }
}
