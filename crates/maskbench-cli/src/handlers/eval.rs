//! Handler for `maskbench eval`: one file, no claim, result on stdout.

use crate::error::CliResult;
use crate::EvalArgs;
use maskbench::{EvalContext, JobResult, SchemaJob, TokenizerSpec};

/// Evaluate `args.file` and return its result
pub fn evaluate_file(args: &EvalArgs) -> CliResult<JobResult> {
    let job = SchemaJob::load(&args.file)?;
    let tokenizer = TokenizerSpec::parse(&args.tokenizer).build()?;
    let ctx = EvalContext::new(args.engine, tokenizer).with_require_complete(args.require_complete);
    tracing::debug!(file = %args.file.display(), engine = %args.engine, "evaluating single file");
    Ok(ctx.evaluate(&job))
}

/// Evaluate and print the result JSON
pub fn execute_eval(args: &EvalArgs) -> CliResult<()> {
    let result = evaluate_file(args)?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}
