use crate::statement::Statement;

/// A global string constant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalVariable {
    pub name: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Function {
    pub function_name: String,
    pub argument_temps: Vec<String>,
    pub main_body_statements: Vec<Statement>,
    #[serde(default)]
    pub has_return: bool,
    #[serde(default)]
    pub is_public: bool,
}

impl Function {
    pub fn number_of_arguments(&self) -> usize {
        self.argument_temps.len()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompilationUnit {
    #[serde(default)]
    pub global_variables: Vec<GlobalVariable>,
    pub functions: Vec<Function>,
}

impl CompilationUnit {
    pub fn function(&self, name: &str) -> Option<&Function> {
        self.functions.iter().find(|f| f.function_name == name)
    }
}
