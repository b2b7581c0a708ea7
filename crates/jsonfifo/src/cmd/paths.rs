use jsonfifo_endpoint::ChannelPaths;

use crate::cmd::PathsArgs;
use crate::exit::{transport_error, CliResult, SUCCESS};
use crate::output::{print_paths, OutputFormat};

pub fn run(args: PathsArgs, format: OutputFormat) -> CliResult<i32> {
    let paths = ChannelPaths::new(args.dir.resolve(), &args.name, args.role.into())
        .map_err(|err| transport_error("invalid channel", err))?;
    print_paths(&paths, format);
    Ok(SUCCESS)
}
