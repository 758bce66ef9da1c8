use crate::models::{ProcessingOptions, STD_SENTINEL};
use camino::Utf8Path;

/// Build the argument vector for the external tool.
///
/// The grammar is fixed:
///
/// ```text
/// -i <input> [-Area] [-STD <name>] [-GBK] [-dev]
/// ```
///
/// Flags appear in exactly this order and only when their option is set.
/// `-STD` is left out when the name is empty or equals [`STD_SENTINEL`]; the
/// name is otherwise passed through untouched and the tool rejects bad values.
///
/// The result is handed to the process as a literal argv, so nothing here is
/// quoted or escaped.
pub fn build_args(input_path: &Utf8Path, options: &ProcessingOptions) -> Vec<String> {
    let mut args = vec!["-i".to_string(), input_path.to_string()];

    if options.use_area {
        args.push("-Area".to_string());
    }

    if !options.std_name.is_empty() && options.std_name != STD_SENTINEL {
        args.push("-STD".to_string());
        args.push(options.std_name.clone());
    }

    if options.use_gbk {
        args.push("-GBK".to_string());
    }

    if options.dev_mode {
        args.push("-dev".to_string());
    }

    args
}
