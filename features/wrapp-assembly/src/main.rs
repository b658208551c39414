use std::sync::Arc;

use tracing_subscriber::EnvFilter;
use wrapp_assembly::{
    build, launch, Assembler, BuildError, ConfigurationError, ConstructionDescriptor, DynError,
    Extension, Key, ScopeHandle, ScopeId, SealContext,
};

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")),
        )
        .init();

    let plan = match build(describe) {
        Ok(plan) => plan,
        Err(e) => {
            eprintln!("{e}");
            return;
        }
    };
    let layout = plan.layout();
    println!("{layout:#?}");
    let api = layout
        .scopes
        .iter()
        .find(|scope| scope.path == "app/api")
        .map(|scope| scope.scope);

    for _ in 0..2 {
        let app = match launch(&plan) {
            Ok(app) => app,
            Err(e) => {
                eprintln!("{e}");
                return;
            }
        };

        println!("{:?}", app.require::<Greeting>());
        if let Some(api) = api {
            println!("{:?}", app.require_in::<Greeting>(api));
        }

        if let Err(e) = app.shutdown() {
            eprintln!("{e}");
        }
    }
}

fn describe(assembler: &mut Assembler, root: ScopeId) -> Result<(), BuildError> {
    assembler.register_instance(root, "Hello".to_string())?;
    assembler.request_extension::<Banner>(root)?;

    let api = assembler.container(root, "api")?;
    let banner = assembler.request_extension::<Banner>(api)?;
    assembler.extension_mut(banner)?.0 = "api".to_string();

    assembler.register_bean(
        api,
        ConstructionDescriptor::new(
            vec![Key::of::<String>(), Key::of::<ScopeHandle>()],
            |inputs| {
                let word = inputs[0].downcast_ref::<String>()?;
                let scope = inputs[1].downcast_ref::<ScopeHandle>()?;
                Ok::<_, DynError>(Greeting(format!("{word} from '{}'", scope.path)))
            },
        ),
    )?;
    Ok(())
}

#[derive(Debug)]
#[allow(dead_code)]
struct Greeting(String);

/// Registers a banner into every scope it is requested in and prints it on shutdown
struct Banner(String);
impl Extension for Banner {
    type Exposed = String;

    fn create(seed: Option<String>) -> Self {
        Banner(seed.unwrap_or_else(|| "app".to_string()))
    }

    fn expose(&self) -> String {
        self.0.clone()
    }

    fn inheritable() -> bool {
        true
    }

    fn on_seal(&mut self, cx: &mut SealContext<'_>) -> Result<(), ConfigurationError> {
        let banner = Arc::new(format!("== {} ==", self.0));
        // Scopes which already see a greeting keep it
        if cx.lookup(&Key::of::<Greeting>()).is_none() {
            let banner = banner.clone();
            cx.register_bean(ConstructionDescriptor::new(Vec::new(), move |_| {
                Ok::<_, DynError>(Greeting(banner.to_string()))
            }))?;
        }

        let scope = cx.scope_path();
        cx.on_shutdown(move |_| {
            println!("{banner} shutting down '{scope}'");
            Ok(())
        });
        Ok(())
    }
}
