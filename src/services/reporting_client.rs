//! 报表 / 活动查询客户端
//!
//! 使用页面中的会话令牌，以 Bearer 方式访问课程接口

use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, ORIGIN};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::error::{AppError, AppResult, NetworkError};
use crate::models::question::letter_index;

/// 从页面本地存储读到的会话凭据
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionCredentials {
    pub access_token: Option<String>,
    pub course_id: Option<String>,
}

impl SessionCredentials {
    pub fn new(access_token: impl Into<String>, course_id: impl Into<String>) -> Self {
        Self {
            access_token: Some(access_token.into()),
            course_id: Some(course_id.into()),
        }
    }

    /// 令牌和课程编号都存在
    pub fn is_complete(&self) -> bool {
        self.token().is_some() && self.course().is_some()
    }

    fn token(&self) -> Option<&str> {
        self.access_token.as_deref().filter(|s| !s.is_empty())
    }

    fn course(&self) -> Option<&str> {
        self.course_id.as_deref().filter(|s| !s.is_empty())
    }
}

/// 多数人答案查询结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MajorityAnswer {
    /// 得票最多的选项字母
    Letter(char),
    /// 还没有人作答
    NoData,
}

pub struct ReportingClient {
    http: reqwest::Client,
    api_base: String,
    origin: String,
}

impl ReportingClient {
    pub fn new(http: reqwest::Client, api_base: &str, origin: &str) -> Self {
        Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
            origin: origin.to_string(),
        }
    }

    /// 查询当前课堂的活动编号
    pub async fn resolve_activity(&self, creds: &SessionCredentials) -> AppResult<Option<String>> {
        let Some(course) = creds.course() else {
            return Ok(None);
        };
        let url = format!(
            "{}/v2/courses/{}/class-sections?recordsPerPage=1&pageNumber=1\
             &expandChild=activities&expandChild=userActivities&expandChild=attendances\
             &expandChild=questions&expandChild=userQuestions&expandChild=questionGroups",
            self.api_base, course
        );
        let data = self.get_json(&url, creds).await?;
        let activity = pick_activity(&data);
        debug!("活动编号: {:?}", activity);
        Ok(activity)
    }

    /// 查询最后一道题的多数人答案
    pub async fn majority_answer(
        &self,
        creds: &SessionCredentials,
        activity_id: &str,
    ) -> AppResult<MajorityAnswer> {
        let course = creds.course().unwrap_or_default();
        let url = format!(
            "{}/v2/reporting/courses/{}/activities/{}/questions/view",
            self.api_base, course, activity_id
        );
        let data = self.get_json(&url, creds).await?;
        pick_majority(&data)
            .ok_or_else(|| NetworkError::UnexpectedBody { endpoint: url }.into())
    }

    async fn get_json(&self, url: &str, creds: &SessionCredentials) -> AppResult<Value> {
        let token = creds.token().unwrap_or_default();
        let resp = self
            .http
            .get(url)
            .header(AUTHORIZATION, format!("Bearer {}", token))
            .header(ACCEPT, "application/json")
            .header(CONTENT_TYPE, "application/json")
            .header(ORIGIN, self.origin.as_str())
            .send()
            .await
            .map_err(|e| AppError::request_failed(url, e))?;
        if !resp.status().is_success() {
            return Err(NetworkError::BadStatus {
                endpoint: url.to_string(),
                status: resp.status().as_u16(),
            }
            .into());
        }
        resp.json().await.map_err(|e| AppError::request_failed(url, e))
    }
}

/// 第一个课堂的第一个活动的 `_id`
pub fn pick_activity(data: &Value) -> Option<String> {
    data.get(0)?
        .get("activities")?
        .get(0)?
        .get("_id")?
        .as_str()
        .map(str::to_string)
}

/// 最后一道题的答案分布中占比最高的选项
///
/// 返回 None 表示响应结构不符合预期
pub fn pick_majority(data: &Value) -> Option<MajorityAnswer> {
    let overview = data
        .get("questions")?
        .as_array()?
        .last()?
        .get("answerOverview")?
        .as_array()?;
    if overview.is_empty() {
        return Some(MajorityAnswer::NoData);
    }
    let share = |v: &Value| {
        v.get("percentageOfTotalResponses")
            .and_then(Value::as_f64)
            .unwrap_or(0.0)
    };
    let best = overview.iter().fold(&overview[0], |best, cur| {
        if share(cur) > share(best) {
            cur
        } else {
            best
        }
    });
    let letter = best
        .get("answer")?
        .as_str()?
        .trim()
        .chars()
        .next()
        .map(|c| c.to_ascii_uppercase())
        .filter(|c| letter_index(*c).is_some())?;
    Some(MajorityAnswer::Letter(letter))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn activity_is_first_section_first_activity() {
        let data = json!([{ "activities": [{ "_id": "act-1" }, { "_id": "act-2" }] }]);
        assert_eq!(pick_activity(&data).as_deref(), Some("act-1"));
        assert_eq!(pick_activity(&json!([])), None);
    }

    #[test]
    fn majority_uses_last_question_highest_share() {
        let data = json!({
            "questions": [
                { "answerOverview": [{ "answer": "A", "percentageOfTotalResponses": 90 }] },
                { "answerOverview": [
                    { "answer": "B", "percentageOfTotalResponses": 20 },
                    { "answer": "D", "percentageOfTotalResponses": 55.5 },
                    { "answer": "C", "percentageOfTotalResponses": 24.5 }
                ] }
            ]
        });
        assert_eq!(pick_majority(&data), Some(MajorityAnswer::Letter('D')));
    }

    #[test]
    fn empty_overview_means_no_data() {
        let data = json!({ "questions": [{ "answerOverview": [] }] });
        assert_eq!(pick_majority(&data), Some(MajorityAnswer::NoData));
        assert_eq!(pick_majority(&json!({})), None);
    }

    #[test]
    fn credentials_need_token_and_course() {
        assert!(SessionCredentials::new("t", "c").is_complete());
        let partial = SessionCredentials {
            access_token: Some("t".into()),
            course_id: Some(String::new()),
        };
        assert!(!partial.is_complete());
    }
}
