use jsonfifo_endpoint::{ChannelPaths, Role};
use jsonfifo_transport::provision;
use tracing::info;

use crate::cmd::ProvisionArgs;
use crate::exit::{provision_error, transport_error, CliResult, SUCCESS};
use crate::output::{print_paths, OutputFormat};

pub fn run(args: ProvisionArgs, format: OutputFormat) -> CliResult<i32> {
    let paths = ChannelPaths::new(args.dir.resolve(), &args.name, Role::Host)
        .map_err(|err| transport_error("invalid channel", err))?;
    provision(&paths).map_err(|err| provision_error("provision failed", err))?;
    info!(channel = paths.name(), dir = ?paths.directory(), "channel provisioned");

    print_paths(&paths, format);
    Ok(SUCCESS)
}
