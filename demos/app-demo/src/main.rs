use beanery_core::prelude::*;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

// ==================== 配置定义 ====================

#[derive(Debug)]
struct DatabaseConfig {
    host: String,
    port: u16,
    max_connections: u32,
}

#[derive(Debug)]
struct ServerConfig {
    host: String,
    port: u16,
}

/// 管理接口使用的访问令牌
struct ApiToken(String);

// ==================== 业务服务 ====================

/// 数据库服务 - 依赖 DatabaseConfig
#[derive(Debug)]
struct DatabaseService {
    config: Arc<DatabaseConfig>,
}

impl Component for DatabaseService {
    fn create(beans: &BeanManager) -> Result<Self> {
        let config = beans.get(&Symbol::<DatabaseConfig>::of())?;
        println!("📊 Connecting to database: {}:{}", config.host, config.port);
        println!("   Max connections: {}", config.max_connections);
        Ok(Self { config })
    }

    // 销毁回调（类似 Spring 的 @PreDestroy）
    fn pre_destroy(&self) -> Result<()> {
        println!("👋 Closing connections to {}", self.config.host);
        Ok(())
    }
}

impl DatabaseService {
    fn query(&self, sql: &str) -> String {
        format!("Query result for: {}", sql)
    }
}

/// 请求处理器
trait RequestHandler: Send + Sync {
    fn handle(&self, path: &str) -> String;
}

struct UserHandler {
    db: Arc<DatabaseService>,
}

impl Component for UserHandler {
    fn create(beans: &BeanManager) -> Result<Self> {
        Ok(Self {
            db: beans.get(&Symbol::of())?,
        })
    }
}

impl RequestHandler for UserHandler {
    fn handle(&self, path: &str) -> String {
        self.db.query(&format!("SELECT * FROM users -- {}", path))
    }
}

/// 服务器服务 - eager 构造，最先销毁
struct ServerService {
    config: Arc<ServerConfig>,
    handler: Arc<dyn RequestHandler>,
}

impl Component for ServerService {
    fn create(beans: &BeanManager) -> Result<Self> {
        let config = beans.get(&Symbol::<ServerConfig>::of())?;
        let handler = beans.get(&Symbol::<dyn RequestHandler>::of())?;
        println!("🚀 Server bound to {}:{}", config.host, config.port);
        Ok(Self { config, handler })
    }

    fn pre_destroy(&self) -> Result<()> {
        println!("👋 ServerService on port {} shutting down...", self.config.port);
        Ok(())
    }
}

impl ServerService {
    fn handle_request(&self, path: &str) {
        println!("\n🔧 Handling request: {}", path);
        println!("   Response: {}", self.handler.handle(path));
    }
}

// ==================== 装饰器 ====================

/// 访问日志
struct AccessLog;

struct AccessLogged {
    inner: Arc<dyn RequestHandler>,
}

impl BeanDecorator<dyn RequestHandler> for AccessLog {
    fn decorate(&self, bean: Arc<dyn RequestHandler>) -> Arc<dyn RequestHandler> {
        Arc::new(AccessLogged { inner: bean })
    }
}

impl RequestHandler for AccessLogged {
    fn handle(&self, path: &str) -> String {
        tracing::info!("--> {}", path);
        let response = self.inner.handle(path);
        tracing::info!("<-- {} ({} bytes)", path, response.len());
        response
    }
}

/// 鉴权 - 由管理器构造，依赖 ApiToken
struct AuthGuard {
    token: Arc<ApiToken>,
}

struct Authorized {
    inner: Arc<dyn RequestHandler>,
    token: Arc<ApiToken>,
}

impl Component for AuthGuard {
    fn create(beans: &BeanManager) -> Result<Self> {
        Ok(Self {
            token: beans.get(&Symbol::of())?,
        })
    }
}

impl BeanDecorator<dyn RequestHandler> for AuthGuard {
    fn decorate(&self, bean: Arc<dyn RequestHandler>) -> Arc<dyn RequestHandler> {
        Arc::new(Authorized {
            inner: bean,
            token: Arc::clone(&self.token),
        })
    }
}

impl RequestHandler for Authorized {
    fn handle(&self, path: &str) -> String {
        if path.starts_with("/admin") && self.token.0.is_empty() {
            return "403 Forbidden".to_string();
        }
        self.inner.handle(path)
    }
}

// ==================== 插件（multi） ====================

trait Plugin: Send + Sync {
    fn name(&self) -> &str;
}

struct MetricsPlugin;
struct HealthPlugin;

impl Plugin for MetricsPlugin {
    fn name(&self) -> &str {
        "metrics"
    }
}

impl Plugin for HealthPlugin {
    fn name(&self) -> &str {
        "health"
    }
}

// ==================== 初始化器 ====================

struct SchemaMigration {
    db: Arc<DatabaseService>,
}

impl Component for SchemaMigration {
    fn create(beans: &BeanManager) -> Result<Self> {
        Ok(Self {
            db: beans.get(&Symbol::of())?,
        })
    }
}

#[beanery_core::async_trait::async_trait]
impl Initializer for SchemaMigration {
    async fn init(&self) -> Result<()> {
        println!("🗄️  Running schema migrations: {}", self.db.query("CREATE TABLE users"));
        Ok(())
    }
}

// ==================== 主程序 ====================

#[tokio::main]
async fn main() -> Result<()> {
    // 查找配置文件
    let config_paths = ["demos/app-demo/application.toml", "application.toml"];
    let config_file = config_paths.into_iter().find(|path| Path::new(path).exists());

    // 日志和启动配置读取同一个文件，环境变量优先
    let (logging, config) = match config_file {
        Some(path) => (LoggingConfig::from_file(path)?, BeanManagerConfig::from_file(path)?),
        None => (LoggingConfig::default(), BeanManagerConfig::default()),
    };
    logging.with_env_overrides().init()?;
    let config = config.with_env_overrides();

    println!("\n╔════════════════════════════════════════════════════╗");
    println!("║        Beanery Bean Manager - Complete Demo        ║");
    println!("╚════════════════════════════════════════════════════╝\n");

    tracing::info!("Loaded bean manager config from {:?}: {:?}", config_file, config);

    let beans = BeanManager::new();

    // 值
    beans.register(
        &Symbol::<DatabaseConfig>::of(),
        BeanInstructions::new().use_value(Arc::new(DatabaseConfig {
            host: "localhost".to_string(),
            port: 5432,
            max_connections: 16,
        })),
    )?;
    beans.register(
        &Symbol::<ServerConfig>::of(),
        BeanInstructions::new().use_value(Arc::new(ServerConfig {
            host: "0.0.0.0".to_string(),
            port: 8080,
        })),
    )?;
    beans.register(
        &Symbol::<ApiToken>::of(),
        BeanInstructions::new().use_value(Arc::new(ApiToken("s3cr3t".to_string()))),
    )?;

    // 组件
    beans.register_component::<DatabaseService>()?;
    beans.register(
        &Symbol::<dyn RequestHandler>::of(),
        BeanInstructions::new().use_class_as::<UserHandler>(|handler: Arc<UserHandler>| -> Arc<dyn RequestHandler> {
            handler
        }),
    )?;
    beans.register_component_with::<ServerService>(BeanInstructions::new().eager(true).destroy_order(-1))?;

    // 别名
    let primary_db = Symbol::<DatabaseService>::token("primaryDatabase");
    beans.register(&primary_db, BeanInstructions::new().use_existing(Symbol::of()))?;

    // multi
    let plugins = Symbol::<dyn Plugin>::token("plugins");
    beans.register(&plugins, BeanInstructions::<dyn Plugin>::new().use_value(Arc::new(MetricsPlugin)).multi(true))?;
    beans.register(
        &plugins,
        BeanInstructions::<dyn Plugin>::new()
            .use_factory(|_| Ok(Arc::new(HealthPlugin)))
            .multi(true)
            .with_destroy(|plugin| {
                println!("👋 Plugin '{}' stopped", plugin.name());
                Ok(())
            }),
    )?;

    // 装饰器：AccessLog 在最外层
    let handler = Symbol::<dyn RequestHandler>::of();
    beans.register_decorator(&handler, DecoratorInstructions::<dyn RequestHandler>::use_value(Arc::new(AccessLog)))?;
    beans.register_decorator(&handler, DecoratorInstructions::use_class::<AuthGuard>())?;

    // 初始化器
    beans.register_initializer(InitializerInstructions::use_class::<SchemaMigration>().runlevel(0))?;
    beans.register_initializer_fn(|beans| async move {
        let handler = beans.get(&Symbol::<dyn RequestHandler>::of())?;
        tokio::time::sleep(Duration::from_millis(50)).await;
        println!("🔥 Cache warmed: {}", handler.handle("/api/users/top"));
        Ok(())
    })?;
    beans.register_initializer_fn(move |beans| {
        let plugins = plugins.clone();
        async move {
            for plugin in beans.all(&plugins)? {
                println!("🔌 Plugin loaded: {}", plugin.name());
            }
            Ok(())
        }
    })?;

    let ready = beans.when_runlevel(2);
    let watcher = tokio::spawn(async move {
        ready.await;
        tracing::info!("Runlevel 2 reached, eager beans are up");
    });

    beans.start(config).await?;
    watcher.await?;

    println!("\n╔════════════════════════════════════════════════════╗");
    println!("║              Application Started                   ║");
    println!("╚════════════════════════════════════════════════════╝");

    {
        let server = beans.get(&Symbol::<ServerService>::of())?;
        server.handle_request("/api/users");
        server.handle_request("/admin/users");

        let db = beans.get(&Symbol::<DatabaseService>::of())?;
        let alias = beans.get(&primary_db)?;
        println!("\n🔗 primaryDatabase is the same instance: {}", Arc::ptr_eq(&db, &alias));

        let cache = Symbol::<String>::token("cacheUrl");
        let cache_url = beans.get_or(&cache, Arc::new("memory://".to_string()))?;
        println!("🗃️  Cache url (fallback): {}", cache_url);

        let temporary = beans.register(&cache, BeanInstructions::new().use_value(Arc::new("redis://cache".to_string())))?;
        println!("🗃️  Cache url (registered): {}", beans.get(&cache)?);
        temporary.unregister();
        println!("🗃️  Cache registered after unregister: {}", beans.contains(&cache));
    }

    println!("\n📋 Registered beans:");
    for name in beans.symbols() {
        println!("   {}", name);
    }

    println!("\n╔════════════════════════════════════════════════════╗");
    println!("║           Shutting Down Application                ║");
    println!("╚════════════════════════════════════════════════════╝\n");

    beans.destroy();

    println!("\n✅ Application shutdown complete!");
    Ok(())
}
