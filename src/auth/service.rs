//! # 账户服务
//!
//! 注册、登录、令牌认证与启动时的管理员初始化

use chrono::Utc;
use entity::{Users, users};
use regex::Regex;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait, QueryFilter, Set,
    SqlErr,
};
use std::sync::{Arc, OnceLock};

use super::jwt::JwtManager;
use super::password::{ensure_password_strength, hash_password, verify_password};
use super::types::{AuthContext, LoginRequest, LoginResponse, RegisterRequest, UserProfile, UserRole};
use crate::config::AdminBootstrapConfig;
use crate::error::{FieldError, HubError, Result};
use crate::logging::{LogComponent, LogStage};
use crate::{ensure_valid, linfo, lwarn};

/// 用户名最小长度
pub const MIN_USERNAME_LEN: usize = 3;

/// 未知用户与密码错误使用同一条消息
const INVALID_CREDENTIALS: &str = "用户名或密码错误";

/// 账户服务
#[derive(Clone)]
pub struct AuthService {
    db: Arc<DatabaseConnection>,
    jwt: Arc<JwtManager>,
    bcrypt_cost: u32,
}

impl AuthService {
    pub fn new(db: Arc<DatabaseConnection>, jwt: Arc<JwtManager>, bcrypt_cost: u32) -> Self {
        Self {
            db,
            jwt,
            bcrypt_cost,
        }
    }

    /// 注册普通用户
    pub async fn register(&self, request: RegisterRequest) -> Result<UserProfile> {
        self.create_user(request, UserRole::User).await
    }

    /// 用户名或邮箱登录
    pub async fn login(&self, request: LoginRequest) -> Result<LoginResponse> {
        let login = request.username.trim();
        ensure_valid!(
            !login.is_empty() && !request.password.is_empty(),
            "用户名和密码不能为空"
        );

        let user = Users::find()
            .filter(
                Condition::any()
                    .add(users::Column::Username.eq(login))
                    .add(users::Column::Email.eq(login.to_lowercase())),
            )
            .one(self.db.as_ref())
            .await?;

        let Some(user) = user.filter(|u| verify_password(&request.password, &u.password_hash))
        else {
            lwarn!(
                "system",
                LogStage::Authentication,
                LogComponent::Auth,
                "login_failed",
                "登录失败",
                login = %login
            );
            return Err(HubError::auth(INVALID_CREDENTIALS));
        };

        let profile = UserProfile::from(user);
        let token = self
            .jwt
            .generate_token(profile.id, &profile.username, profile.role)?;

        linfo!(
            "system",
            LogStage::Authentication,
            LogComponent::Auth,
            "login",
            "用户登录成功",
            user_id = profile.id
        );

        Ok(LoginResponse {
            token,
            token_type: "Bearer".to_string(),
            expires_in: self.jwt.expires_in(),
            user: profile,
        })
    }

    /// 当前账户
    pub async fn me(&self, user_id: i32) -> Result<UserProfile> {
        Users::find_by_id(user_id)
            .one(self.db.as_ref())
            .await?
            .map(UserProfile::from)
            .ok_or_else(|| HubError::not_found("user", user_id.to_string()))
    }

    /// 校验令牌并还原调用者身份
    pub fn authenticate(&self, token: &str) -> Result<AuthContext> {
        AuthContext::try_from(self.jwt.validate_token(token)?)
    }

    /// 确保配置的管理员账户存在，返回是否新建
    pub async fn ensure_admin(&self, admin: &AdminBootstrapConfig) -> Result<bool> {
        let exists = Users::find()
            .filter(users::Column::Username.eq(admin.username.trim()))
            .one(self.db.as_ref())
            .await?
            .is_some();
        if exists {
            return Ok(false);
        }

        let profile = self
            .create_user(
                RegisterRequest {
                    username: admin.username.clone(),
                    email: admin.email.clone(),
                    password: admin.password.clone(),
                },
                UserRole::Admin,
            )
            .await?;

        linfo!(
            "system",
            LogStage::Startup,
            LogComponent::Auth,
            "bootstrap_admin",
            "已创建管理员账户",
            username = %profile.username
        );
        Ok(true)
    }

    async fn create_user(&self, request: RegisterRequest, role: UserRole) -> Result<UserProfile> {
        let username = request.username.trim().to_string();
        let email = request.email.trim().to_lowercase();

        let mut details = Vec::new();
        if username.chars().count() < MIN_USERNAME_LEN {
            details.push(FieldError::new(
                "username",
                format!("用户名至少{MIN_USERNAME_LEN}个字符"),
            ));
        }
        if !is_valid_email(&email) {
            details.push(FieldError::new("email", "邮箱格式无效"));
        }
        if let Err(err) = ensure_password_strength("password", &request.password) {
            details.extend(err.details().unwrap_or_default().iter().cloned());
        }
        if !details.is_empty() {
            return Err(HubError::validation_with_details("注册信息无效", details));
        }

        self.ensure_unique_user(&username, &email).await?;

        let now = Utc::now().naive_utc();
        let user = users::ActiveModel {
            username: Set(username),
            email: Set(email),
            password_hash: Set(hash_password(&request.password, self.bcrypt_cost)?),
            role: Set(role.as_str().to_string()),
            reset_token_hash: Set(None),
            reset_token_expires_at: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(self.db.as_ref())
        .await
        .map_err(|err| match err.sql_err() {
            Some(SqlErr::UniqueConstraintViolation(_)) => {
                HubError::conflict("user", "用户名或邮箱已被使用")
            }
            _ => err.into(),
        })?;

        linfo!(
            "system",
            LogStage::Db,
            LogComponent::Auth,
            "register",
            "用户注册成功",
            user_id = user.id,
            role = role.as_str()
        );

        Ok(UserProfile::from(user))
    }

    async fn ensure_unique_user(&self, username: &str, email: &str) -> Result<()> {
        let existing = Users::find()
            .filter(
                Condition::any()
                    .add(users::Column::Username.eq(username))
                    .add(users::Column::Email.eq(email)),
            )
            .one(self.db.as_ref())
            .await?;

        match existing {
            Some(user) if user.username == username => {
                Err(HubError::conflict("user", "用户名已存在"))
            }
            Some(_) => Err(HubError::conflict("user", "邮箱已被注册")),
            None => Ok(()),
        }
    }
}

const EMAIL_PATTERN: &str = r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$";

/// 邮箱格式检查
pub(crate) fn is_valid_email(email: &str) -> bool {
    static EMAIL_REGEX: OnceLock<Option<Regex>> = OnceLock::new();
    email.len() <= 255
        && EMAIL_REGEX
            .get_or_init(|| Regex::new(EMAIL_PATTERN).ok())
            .as_ref()
            .is_some_and(|re| re.is_match(email))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::helpers::{create_test_db, test_security_config};
    use rstest::rstest;

    async fn service() -> AuthService {
        let jwt = JwtManager::new(&test_security_config()).unwrap();
        AuthService::new(Arc::new(create_test_db().await), Arc::new(jwt), 4)
    }

    fn alice() -> RegisterRequest {
        RegisterRequest {
            username: " alice ".to_string(),
            email: "Alice@Example.com".to_string(),
            password: "secret123".to_string(),
        }
    }

    #[rstest]
    #[case("a@b.co", true)]
    #[case("alice.smith+hub@example.com", true)]
    #[case("Alice@Example.COM", true)]
    #[case("a@b", false)]
    #[case("a b@c.com", false)]
    #[case("a@@b.com", false)]
    #[case("@b.com", false)]
    #[case("alice@example.c", false)]
    #[case("alice@example.com ", false)]
    fn test_email_check(#[case] email: &str, #[case] valid: bool) {
        assert_eq!(is_valid_email(email), valid);
    }

    #[tokio::test]
    async fn test_register_and_login() {
        let service = service().await;
        let profile = service.register(alice()).await.unwrap();
        assert_eq!(profile.username, "alice");
        assert_eq!(profile.email, "alice@example.com");
        assert_eq!(profile.role, UserRole::User);

        for login in ["alice", "ALICE@example.com"] {
            let response = service
                .login(LoginRequest {
                    username: login.to_string(),
                    password: "secret123".to_string(),
                })
                .await
                .unwrap();
            assert_eq!(response.token_type, "Bearer");
            let context = service.authenticate(&response.token).unwrap();
            assert_eq!(context.user_id, profile.id);
        }
    }

    #[tokio::test]
    async fn test_same_message_for_unknown_user_and_bad_password() {
        let service = service().await;
        service.register(alice()).await.unwrap();

        let unknown = service
            .login(LoginRequest {
                username: "mallory".to_string(),
                password: "secret123".to_string(),
            })
            .await
            .unwrap_err();
        let wrong = service
            .login(LoginRequest {
                username: "alice".to_string(),
                password: "wrong-password".to_string(),
            })
            .await
            .unwrap_err();

        assert_eq!(unknown.to_string(), wrong.to_string());
        assert!(matches!(wrong, HubError::Auth { .. }));
    }

    #[tokio::test]
    async fn test_register_validation_and_conflicts() {
        let service = service().await;
        let err = service
            .register(RegisterRequest {
                username: "ab".to_string(),
                email: "nope".to_string(),
                password: "123".to_string(),
            })
            .await
            .unwrap_err();
        assert_eq!(err.details().map(<[FieldError]>::len), Some(3));

        service.register(alice()).await.unwrap();
        let duplicate_email = RegisterRequest {
            username: "alice2".to_string(),
            ..alice()
        };
        assert!(matches!(
            service.register(duplicate_email).await,
            Err(HubError::Conflict { .. })
        ));
    }

    #[tokio::test]
    async fn test_ensure_admin_is_idempotent() {
        let service = service().await;
        let admin = AdminBootstrapConfig {
            username: "admin".to_string(),
            email: "admin@example.com".to_string(),
            password: "admin123".to_string(),
        };

        assert!(service.ensure_admin(&admin).await.unwrap());
        assert!(!service.ensure_admin(&admin).await.unwrap());

        let response = service
            .login(LoginRequest {
                username: "admin".to_string(),
                password: "admin123".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(response.user.role, UserRole::Admin);
    }
}
