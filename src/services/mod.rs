//! Pipeline stages and the loop that drives them.

pub mod batch;
pub mod budget;
pub mod evaluator;
pub mod orchestrator;
pub mod prompts;
pub mod query_generator;
pub mod question_generator;
pub mod report_generator;
pub mod retrieval;
pub mod structured;
pub mod truncation;

pub use batch::{ArticleOutcome, BatchRunner, BatchSummary};
pub use budget::{BudgetExhausted, RunBudget};
pub use evaluator::InformationEvaluator;
pub use orchestrator::{LoopOrchestrator, RunSettings};
pub use query_generator::QueryGenerator;
pub use question_generator::QuestionGenerator;
pub use report_generator::ReportGenerator;
pub use retrieval::{DenseReranker, LexicalStage, Retrieval, SegmentRetriever, SemanticFilter};
pub use structured::{CallError, StructuredCaller};
