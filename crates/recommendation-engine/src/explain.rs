use async_trait::async_trait;

const BATCH_SIZE: usize = 10;
const MAX_LLM_CALLS: usize = 2;

/// The LLM call itself is an external collaborator (§1 non-goals: "LLM
/// explanation formatting"); this crate only owns the batching/quota/
/// fallback orchestration around it. `complete` receives one prompt per
/// batch and must return a JSON array of exactly `batch_len` strings.
#[async_trait]
pub trait ExplanationClient: Send + Sync {
    async fn complete(&self, prompt: &str, batch_len: usize) -> anyhow::Result<Vec<String>>;
}

/// Best-effort narrative per recommendation, one per `key_factors` list, in
/// the same order. Batches of `BATCH_SIZE`; at most `MAX_LLM_CALLS` batches
/// actually reach the client per cycle — the rest fall straight to the
/// rule-based template, same as any batch whose call fails or returns a
/// malformed response (§4.7).
pub async fn annotate(client: Option<&dyn ExplanationClient>, key_factors: &[Vec<String>]) -> Vec<String> {
    let mut out = Vec::with_capacity(key_factors.len());
    let mut calls_used = 0usize;

    for batch in key_factors.chunks(BATCH_SIZE) {
        let mut annotated = None;

        if let Some(client) = client {
            if calls_used < MAX_LLM_CALLS {
                calls_used += 1;
                let prompt = build_prompt(batch);
                if let Ok(lines) = client.complete(&prompt, batch.len()).await {
                    if lines.len() == batch.len() {
                        annotated = Some(lines);
                    }
                }
            }
        }

        match annotated {
            Some(lines) => out.extend(lines),
            None => out.extend(batch.iter().map(|tags| rule_based(tags))),
        }
    }

    out
}

fn build_prompt(batch: &[Vec<String>]) -> String {
    let items: Vec<String> = batch.iter().map(|tags| tags.join("; ")).collect();
    format!("Summarize each set of factor tags into one short sentence, as a JSON array of {} strings, same order:\n{}", batch.len(), items.join("\n"))
}

fn rule_based(tags: &[String]) -> String {
    if tags.is_empty() {
        "暂无足够因子数据支持说明".to_string()
    } else {
        tags.join("；")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct AlwaysFails;

    #[async_trait]
    impl ExplanationClient for AlwaysFails {
        async fn complete(&self, _prompt: &str, _batch_len: usize) -> anyhow::Result<Vec<String>> {
            Err(anyhow::anyhow!("boom"))
        }
    }

    struct Echoes;

    #[async_trait]
    impl ExplanationClient for Echoes {
        async fn complete(&self, _prompt: &str, batch_len: usize) -> anyhow::Result<Vec<String>> {
            Ok((0..batch_len).map(|i| format!("summary {i}")).collect())
        }
    }

    #[tokio::test]
    async fn falls_back_to_rule_based_on_client_failure() {
        let key_factors = vec![vec!["ROE优秀 (22.0%)".to_string()], vec![]];
        let out = annotate(Some(&AlwaysFails), &key_factors).await;
        assert_eq!(out[0], "ROE优秀 (22.0%)");
        assert_eq!(out[1], "暂无足够因子数据支持说明");
    }

    #[tokio::test]
    async fn no_client_uses_rule_based_for_everything() {
        let key_factors = vec![vec!["a".to_string(), "b".to_string()]];
        let out = annotate(None, &key_factors).await;
        assert_eq!(out[0], "a；b");
    }

    #[tokio::test]
    async fn stops_calling_client_after_quota_exhausted() {
        let key_factors: Vec<Vec<String>> = (0..25).map(|i| vec![format!("tag{i}")]).collect();
        let out = annotate(Some(&Echoes), &key_factors).await;
        assert_eq!(out.len(), 25);
        assert_eq!(out[0], "summary 0");
        assert_eq!(out[19], "summary 9");
        assert_eq!(out[20], "tag20");
    }

    #[tokio::test]
    async fn never_reorders_or_drops() {
        let key_factors = vec![vec!["x".to_string()], vec!["y".to_string()], vec!["z".to_string()]];
        let out = annotate(None, &key_factors).await;
        assert_eq!(out, vec!["x", "y", "z"]);
    }
}
