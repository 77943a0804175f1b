use super::ansible::{
    AddTaskTool, AnalyzePlaybookTool, AnalyzeRoleTool, FindTasksUsingModuleTool,
    GetVariableUsageTool, ModifyTaskTool, ModifyVariableTool, ModifyYamlFileTool,
    ScanAnsibleProjectTool,
};
use super::file_ops::{
    DeleteFileTool, FileExistsTool, ListDirectoryTool, ReadFileTool, WriteFileTool,
};
use super::git_ops::GitTool;
use super::python::{
    AddFunctionTool, AddImportTool, AnalyzePythonFileTool, FindClassesTool, FindFunctionsTool,
    FindImportsTool, FindPythonPatternTool, ModifyPythonCodeTool,
};
use super::reference_doc::ReadReferenceDocumentTool;
use super::search::{FindFilesTool, SearchInFilesTool};
use super::shell::ShellTool;
use super::{Tool, ToolRegistry};

/// Every tool in the catalog.
pub fn default_tools() -> Vec<Box<dyn Tool>> {
    let mut tools: Vec<Box<dyn Tool>> = vec![
        Box::new(ReadFileTool),
        Box::new(ListDirectoryTool),
        Box::new(FileExistsTool),
        Box::new(WriteFileTool),
        Box::new(DeleteFileTool),
        Box::new(ShellTool),
        Box::new(FindFilesTool),
        Box::new(SearchInFilesTool),
        Box::new(AnalyzePythonFileTool),
        Box::new(FindPythonPatternTool),
        Box::new(FindFunctionsTool),
        Box::new(FindClassesTool),
        Box::new(FindImportsTool),
        Box::new(ModifyPythonCodeTool),
        Box::new(AddImportTool),
        Box::new(AddFunctionTool),
        Box::new(ScanAnsibleProjectTool),
        Box::new(AnalyzePlaybookTool),
        Box::new(AnalyzeRoleTool),
        Box::new(FindTasksUsingModuleTool),
        Box::new(GetVariableUsageTool),
        Box::new(ModifyTaskTool),
        Box::new(AddTaskTool),
        Box::new(ModifyVariableTool),
        Box::new(ModifyYamlFileTool),
        Box::new(ReadReferenceDocumentTool),
    ];
    tools.extend(
        GitTool::KINDS
            .into_iter()
            .filter_map(GitTool::new)
            .map(|tool| Box::new(tool) as Box<dyn Tool>),
    );
    tools
}

/// Create the default tool registry
pub fn default_registry() -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    for tool in default_tools() {
        registry.register(tool);
    }
    registry
}
